//! Consumer bound to a single topic with a group identifier.
//!
//! Wraps broker channel setup for the delivery workers: durable queue
//! declaration, prefetch control, and a message stream with explicit
//! acknowledgement. Messages stay on the queue until acknowledged, giving
//! the workers at-least-once semantics.

use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    Channel, Connection, ConnectionProperties, Consumer,
};
use tracing::info;

use crate::error::{QueueError, Result};

/// Consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Broker connection URL.
    pub url: String,
    /// Topic (durable queue) to consume.
    pub topic: String,
    /// Group identifier, used as the consumer tag.
    pub group_id: String,
    /// Unacknowledged message window per consumer.
    pub prefetch: u16,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672/%2f".to_string(),
            topic: "email.queue".to_string(),
            group_id: "email-worker".to_string(),
            prefetch: 10,
        }
    }
}

/// Topic consumer with explicit acknowledgement.
pub struct QueueConsumer {
    channel: Channel,
    config: ConsumerConfig,
}

impl QueueConsumer {
    /// Connects to the broker, declares the durable topic queue, and applies
    /// the prefetch window.
    pub async fn connect(config: ConsumerConfig) -> Result<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(QueueError::Connect)?;

        let channel = connection.create_channel().await.map_err(QueueError::Connect)?;

        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await
            .map_err(|source| QueueError::Consume { topic: config.topic.clone(), source })?;

        channel
            .queue_declare(
                &config.topic,
                QueueDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await
            .map_err(|source| QueueError::Consume { topic: config.topic.clone(), source })?;

        info!(topic = %config.topic, group = %config.group_id, "consumer connected");

        Ok(Self { channel, config })
    }

    /// Opens the message stream.
    pub async fn stream(&self) -> Result<Consumer> {
        self.channel
            .basic_consume(
                &self.config.topic,
                &self.config.group_id,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| QueueError::Consume { topic: self.config.topic.clone(), source })
    }

    /// Acknowledges a processed message.
    pub async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|source| QueueError::Consume { topic: self.config.topic.clone(), source })
    }

    /// Rejects a message, optionally requeueing it.
    pub async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|source| QueueError::Consume { topic: self.config.topic.clone(), source })
    }

    /// Topic this consumer is bound to.
    pub fn topic(&self) -> &str {
        &self.config.topic
    }
}
