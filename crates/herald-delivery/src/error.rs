//! Error types for email delivery operations.
//!
//! Categorizes failures so the worker can tell poison messages (skip) from
//! transient SMTP faults (retry under the budget) and terminal conditions
//! (report failed and move on).

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Failures in the email delivery path.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// SMTP transport failure.
    #[error("smtp delivery failed: {message}")]
    Smtp {
        /// Transport error detail.
        message: String,
    },

    /// The job payload could not be used (bad address, unbuildable message).
    #[error("invalid delivery job: {message}")]
    InvalidJob {
        /// What was wrong with the job.
        message: String,
    },

    /// The job carries no recipient and no fallback is configured.
    #[error("delivery job has no recipient address")]
    MissingRecipient,

    /// Status callback to the orchestrator failed.
    #[error("status callback failed: {message}")]
    Callback {
        /// Callback failure detail.
        message: String,
    },

    /// Worker configuration is invalid.
    #[error("invalid worker configuration: {message}")]
    Configuration {
        /// Configuration error detail.
        message: String,
    },
}

impl DeliveryError {
    /// Creates an SMTP transport error.
    pub fn smtp(message: impl Into<String>) -> Self {
        Self::Smtp { message: message.into() }
    }

    /// Creates an invalid-job error.
    pub fn invalid_job(message: impl Into<String>) -> Self {
        Self::InvalidJob { message: message.into() }
    }

    /// Creates a callback error.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether the failure is transient from the sender's point of view.
    ///
    /// Only transport faults qualify; bad jobs and missing recipients will
    /// not improve on retry.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Smtp { .. } | Self::Callback { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_faults_are_retryable() {
        assert!(DeliveryError::smtp("connection refused").is_retryable());
        assert!(DeliveryError::callback("orchestrator unreachable").is_retryable());

        assert!(!DeliveryError::invalid_job("unparseable recipient").is_retryable());
        assert!(!DeliveryError::MissingRecipient.is_retryable());
        assert!(!DeliveryError::configuration("bad from address").is_retryable());
    }

    #[test]
    fn display_carries_detail() {
        assert_eq!(
            DeliveryError::smtp("454 try later").to_string(),
            "smtp delivery failed: 454 try later"
        );
    }
}
