//! Error types for message log operations.

use thiserror::Error;

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors produced by producers, the manager, and the consumer.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Broker connection or channel setup failed.
    #[error("failed to connect to message broker: {0}")]
    Connect(#[source] lapin::Error),

    /// Payload could not be serialized to JSON.
    #[error("failed to serialize message for topic {topic}: {source}")]
    Serialize {
        /// Topic the message was destined for.
        topic: String,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Broker write failed.
    #[error("failed to publish message to topic {topic}: {source}")]
    Publish {
        /// Topic the write targeted.
        topic: String,
        /// Underlying broker error.
        #[source]
        source: lapin::Error,
    },

    /// Broker did not confirm the write within the publish timeout.
    #[error("publish to topic {topic} timed out after {timeout_secs}s")]
    PublishTimeout {
        /// Topic the write targeted.
        topic: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// Broker negatively acknowledged the write.
    #[error("broker refused message for topic {topic}")]
    Refused {
        /// Topic the write targeted.
        topic: String,
    },

    /// Consumer setup or acknowledgement failed.
    #[error("consumer operation failed on topic {topic}: {source}")]
    Consume {
        /// Topic the consumer is bound to.
        topic: String,
        /// Underlying broker error.
        #[source]
        source: lapin::Error,
    },

    /// Producer close failed.
    #[error("failed to close producer for topic {topic}: {source}")]
    Close {
        /// Topic of the producer being closed.
        topic: String,
        /// Underlying broker error.
        #[source]
        source: lapin::Error,
    },

    /// `publish_by_type` received a type outside `email`/`push`.
    #[error("unsupported notification type: {kind}")]
    UnsupportedKind {
        /// The rejected type string.
        kind: String,
    },
}
