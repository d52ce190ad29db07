//! Per-topic producer with keyed publishes and cumulative statistics.
//!
//! Each producer encapsulates one topic (a durable queue on the broker).
//! Messages are JSON-serialized, keyed by the caller-supplied key, published
//! persistently, and confirmed by the broker before `publish` returns. A
//! failed write is retried at the connector level up to three attempts
//! before the error surfaces to the caller. Because every message for a key
//! lands on the same queue, per-key ordering is preserved end to end.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel,
};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::{QueueError, Result};

/// Default broker confirmation timeout per write.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Broker write attempts per publish before the error surfaces to callers.
pub const MAX_ATTEMPTS: u32 = 3;

/// Pause between broker write attempts.
const ATTEMPT_BACKOFF: Duration = Duration::from_millis(100);

/// Persistent delivery mode for published messages.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Cumulative producer counters.
#[derive(Debug, Default)]
pub struct ProducerCounters {
    writes: AtomicU64,
    messages: AtomicU64,
    bytes: AtomicU64,
    errors: AtomicU64,
}

impl ProducerCounters {
    fn record_write(&self, messages: u64, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.messages.fetch_add(messages, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ProducerStats {
        ProducerStats {
            writes: self.writes.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of a producer's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProducerStats {
    /// Completed write round-trips.
    pub writes: u64,
    /// Messages written.
    pub messages: u64,
    /// Payload bytes written.
    pub bytes: u64,
    /// Failed writes.
    pub errors: u64,
}

/// A keyed message for batch publication.
#[derive(Debug, Clone)]
pub struct BatchMessage<T> {
    /// Partitioning key.
    pub key: String,
    /// Payload, serialized to JSON on publish.
    pub value: T,
}

/// Producer bound to a single topic.
pub struct Producer {
    channel: Channel,
    topic: String,
    publish_timeout: Duration,
    counters: Arc<ProducerCounters>,
}

impl Producer {
    /// Creates a producer on an existing broker channel, declaring the topic
    /// as a durable queue and enabling publisher confirms so every write is
    /// durable to the broker before `publish` returns.
    pub async fn new(channel: Channel, topic: impl Into<String>) -> Result<Self> {
        let topic = topic.into();

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(QueueError::Connect)?;

        channel
            .queue_declare(
                &topic,
                QueueDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await
            .map_err(QueueError::Connect)?;

        Ok(Self {
            channel,
            topic,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            counters: Arc::new(ProducerCounters::default()),
        })
    }

    /// Topic this producer writes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Serializes `value` to JSON and writes one keyed message.
    pub async fn publish<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value).map_err(|source| {
            error!(topic = %self.topic, key, "failed to serialize message");
            self.counters.record_error();
            QueueError::Serialize { topic: self.topic.clone(), source }
        })?;

        debug!(topic = %self.topic, key, "publishing message");

        self.write(key, &payload).await?;
        self.counters.record_write(1, payload.len() as u64);

        info!(topic = %self.topic, key, "message published successfully");
        Ok(())
    }

    /// Writes many keyed messages in one confirmed round-trip.
    pub async fn publish_batch<T: Serialize + Sync>(
        &self,
        messages: &[BatchMessage<T>],
    ) -> Result<()> {
        let mut payloads = Vec::with_capacity(messages.len());
        let mut bytes = 0u64;
        for (index, message) in messages.iter().enumerate() {
            let payload = serde_json::to_vec(&message.value).map_err(|source| {
                error!(topic = %self.topic, index, "failed to serialize batch message");
                self.counters.record_error();
                QueueError::Serialize { topic: self.topic.clone(), source }
            })?;
            bytes += payload.len() as u64;
            payloads.push((message.key.as_str(), payload));
        }

        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt_batch(&payloads).await {
                Ok(()) => {
                    self.counters.record_write(payloads.len() as u64, bytes);
                    info!(
                        topic = %self.topic,
                        count = payloads.len(),
                        "batch published successfully"
                    );
                    return Ok(());
                },
                Err(err) => {
                    if attempt < MAX_ATTEMPTS {
                        debug!(
                            topic = %self.topic,
                            attempt,
                            error = %err,
                            "batch publish attempt failed, retrying"
                        );
                        tokio::time::sleep(ATTEMPT_BACKOFF).await;
                    }
                    last_error = Some(err);
                },
            }
        }

        self.counters.record_error();
        error!(
            topic = %self.topic,
            attempts = MAX_ATTEMPTS,
            count = payloads.len(),
            "batch publish failed after all attempts"
        );
        Err(last_error.unwrap_or_else(|| QueueError::Refused { topic: self.topic.clone() }))
    }

    /// Flushes and releases the underlying channel.
    pub async fn close(&self) -> Result<()> {
        info!(topic = %self.topic, "closing producer");
        self.channel
            .close(200, "producer closed")
            .await
            .map_err(|source| QueueError::Close { topic: self.topic.clone(), source })
    }

    /// Returns a snapshot of the cumulative counters.
    pub fn stats(&self) -> ProducerStats {
        self.counters.snapshot()
    }

    /// Writes one keyed message, retrying transient broker failures up to
    /// `MAX_ATTEMPTS` times before the error surfaces.
    async fn write(&self, key: &str, payload: &[u8]) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt_write(key, payload).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if attempt < MAX_ATTEMPTS {
                        debug!(
                            topic = %self.topic,
                            key,
                            attempt,
                            error = %err,
                            "publish attempt failed, retrying"
                        );
                        tokio::time::sleep(ATTEMPT_BACKOFF).await;
                    }
                    last_error = Some(err);
                },
            }
        }

        self.counters.record_error();
        error!(
            topic = %self.topic,
            key,
            attempts = MAX_ATTEMPTS,
            "publish failed after all attempts"
        );
        Err(last_error.unwrap_or_else(|| QueueError::Refused { topic: self.topic.clone() }))
    }

    /// One publish round-trip: write the message and await the broker
    /// confirmation under the publish timeout.
    async fn attempt_write(&self, key: &str, payload: &[u8]) -> Result<()> {
        let publish = async {
            let confirm = self
                .channel
                .basic_publish(
                    "",
                    &self.topic,
                    BasicPublishOptions::default(),
                    payload,
                    self.properties(key),
                )
                .await
                .map_err(|source| QueueError::Publish { topic: self.topic.clone(), source })?;

            confirm
                .await
                .map_err(|source| QueueError::Publish { topic: self.topic.clone(), source })?;
            Ok::<_, QueueError>(())
        };

        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::PublishTimeout {
                topic: self.topic.clone(),
                timeout_secs: self.publish_timeout.as_secs(),
            }),
        }
    }

    /// One batch round-trip: write every message, then await all broker
    /// confirmations under the shared publish timeout.
    async fn attempt_batch(&self, payloads: &[(&str, Vec<u8>)]) -> Result<()> {
        let send_all = async {
            let mut confirms = Vec::with_capacity(payloads.len());
            for (key, payload) in payloads {
                let confirm = self
                    .channel
                    .basic_publish(
                        "",
                        &self.topic,
                        BasicPublishOptions::default(),
                        payload,
                        self.properties(key),
                    )
                    .await
                    .map_err(|source| QueueError::Publish {
                        topic: self.topic.clone(),
                        source,
                    })?;
                confirms.push(confirm);
            }

            for confirm in confirms {
                confirm.await.map_err(|source| QueueError::Publish {
                    topic: self.topic.clone(),
                    source,
                })?;
            }
            Ok::<_, QueueError>(())
        };

        match tokio::time::timeout(self.publish_timeout, send_all).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::PublishTimeout {
                topic: self.topic.clone(),
                timeout_secs: self.publish_timeout.as_secs(),
            }),
        }
    }

    fn properties(&self, key: &str) -> BasicProperties {
        BasicProperties::default()
            .with_content_type("application/json".into())
            .with_message_id(key.into())
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
    }
}
