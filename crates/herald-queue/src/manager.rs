//! Producer manager dispatching publishes to per-channel topics.
//!
//! Owns one producer per delivery channel (email topic, push topic) over a
//! shared broker connection. The manager is the orchestration pipeline's
//! only collaborator for publication.

use lapin::{Connection, ConnectionProperties};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    error::{QueueError, Result},
    producer::{Producer, ProducerStats},
};

/// Broker and topic configuration for the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Broker connection URL.
    pub url: String,
    /// Topic for email delivery jobs.
    pub email_topic: String,
    /// Topic for push delivery jobs.
    pub push_topic: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672/%2f".to_string(),
            email_topic: "email.queue".to_string(),
            push_topic: "push.queue".to_string(),
        }
    }
}

/// Manager owning the per-channel producers.
pub struct Manager {
    email: Producer,
    push: Producer,
}

impl Manager {
    /// Connects to the broker and creates both producers on dedicated
    /// channels of a shared connection.
    pub async fn connect(config: &ManagerConfig) -> Result<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(QueueError::Connect)?;

        let email_channel = connection.create_channel().await.map_err(QueueError::Connect)?;
        let push_channel = connection.create_channel().await.map_err(QueueError::Connect)?;

        let email = Producer::new(email_channel, &config.email_topic).await?;
        let push = Producer::new(push_channel, &config.push_topic).await?;

        info!(
            email_topic = %config.email_topic,
            push_topic = %config.push_topic,
            "queue manager initialized"
        );

        Ok(Self { email, push })
    }

    /// Publishes a payload to the email topic.
    pub async fn publish_email<T: Serialize + Sync>(&self, key: &str, payload: &T) -> Result<()> {
        info!(notification_id = key, "publishing to email topic");
        self.email.publish(key, payload).await
    }

    /// Publishes a payload to the push topic.
    pub async fn publish_push<T: Serialize + Sync>(&self, key: &str, payload: &T) -> Result<()> {
        info!(notification_id = key, "publishing to push topic");
        self.push.publish(key, payload).await
    }

    /// Routes a publish to the topic for `kind`.
    ///
    /// The match is case-sensitive; anything but `email` or `push` is an
    /// error.
    pub async fn publish_by_type<T: Serialize + Sync>(
        &self,
        kind: &str,
        key: &str,
        payload: &T,
    ) -> Result<()> {
        match kind {
            "email" => self.publish_email(key, payload).await,
            "push" => self.publish_push(key, payload).await,
            other => Err(QueueError::UnsupportedKind { kind: other.to_string() }),
        }
    }

    /// Closes all producers, returning the first error encountered.
    pub async fn close(&self) -> Result<()> {
        info!("closing queue manager");

        let mut first_error = None;
        if let Err(err) = self.email.close().await {
            error!(error = %err, "failed to close email producer");
            first_error.get_or_insert(err);
        }
        if let Err(err) = self.push.close().await {
            error!(error = %err, "failed to close push producer");
            first_error.get_or_insert(err);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Surfaces producer error counters for health reporting.
    pub fn health_check(&self) -> (ProducerStats, ProducerStats) {
        let email_stats = self.email.stats();
        if email_stats.errors > 0 {
            warn!(errors = email_stats.errors, "email producer has errors");
        }

        let push_stats = self.push.stats();
        if push_stats.errors > 0 {
            warn!(errors = push_stats.errors, "push producer has errors");
        }

        (email_stats, push_stats)
    }
}
