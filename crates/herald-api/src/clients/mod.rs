//! Clients for the external user and template services.
//!
//! Each HTTP client wraps its calls in a dedicated circuit breaker and the
//! retry engine; breaker sentinels surface as domain errors while staying
//! downcastable for upstream classification. Mock implementations back the
//! `use_mock_services` development flag.

pub mod mocks;
pub mod template;
pub mod user;

use async_trait::async_trait;
use herald_core::models::{JsonMap, RenderResponse, Template, UserPreferences};
use thiserror::Error;

pub use mocks::{MockTemplateService, MockUserService};
pub use template::{HttpTemplateClient, TemplateClientConfig};
pub use user::{HttpUserClient, UserClientConfig};

/// Preference lookup contract with the user service.
#[async_trait]
pub trait UserApi: Send + Sync {
    /// Fetches per-channel delivery preferences for a user.
    async fn get_preferences(&self, user_id: &str) -> anyhow::Result<UserPreferences>;
}

/// Template fetch and render contract with the template service.
#[async_trait]
pub trait TemplateApi: Send + Sync {
    /// Fetches a template catalog entry.
    async fn get_template(&self, template_id: &str, language: &str) -> anyhow::Result<Template>;

    /// Renders a template with the given variables.
    async fn render_template(
        &self,
        template_id: &str,
        language: &str,
        variables: &JsonMap,
    ) -> anyhow::Result<RenderResponse>;
}

/// Typed failure of one outbound service call.
///
/// Display texts feed the retry engine's textual classification: 5xx
/// statuses carry the `status 5` prefix sentinel, timeouts carry
/// `connection timeout`, and the breaker sentinels deliberately avoid every
/// retryable pattern so they short-circuit the retry loop.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The dependency's breaker is open.
    #[error("{service} is temporarily unavailable: circuit breaker is open")]
    Unavailable {
        /// Human name of the dependency.
        service: &'static str,
    },

    /// The dependency's half-open probe budget is exhausted.
    #[error("{service} is recovering, please retry: too many requests in half-open state")]
    Recovering {
        /// Human name of the dependency.
        service: &'static str,
    },

    /// Non-2xx response.
    #[error("{service} returned status {status}: {body}")]
    Status {
        /// Human name of the dependency.
        service: &'static str,
        /// HTTP status code received.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// Request timed out.
    #[error("{service} request failed: connection timeout")]
    Timeout {
        /// Human name of the dependency.
        service: &'static str,
    },

    /// Transport-level failure (connect, TLS, body read).
    #[error("{service} request failed: {source}")]
    Transport {
        /// Human name of the dependency.
        service: &'static str,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Response body did not match the expected shape.
    #[error("failed to decode {service} response: {source}")]
    Decode {
        /// Human name of the dependency.
        service: &'static str,
        /// Underlying decode error.
        #[source]
        source: reqwest::Error,
    },

    /// Client could not be constructed.
    #[error("invalid {service} client configuration: {message}")]
    Configuration {
        /// Human name of the dependency.
        service: &'static str,
        /// What was wrong.
        message: String,
    },
}

impl ClientError {
    /// Maps a transport error onto the timeout/transport split.
    fn from_transport(service: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { service }
        } else {
            Self::Transport { service, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use herald_resilience::is_retryable_error;

    use super::*;

    #[test]
    fn server_status_errors_classify_retryable() {
        let err = anyhow::Error::new(ClientError::Status {
            service: "template service",
            status: 503,
            body: "overloaded".into(),
        });
        assert!(is_retryable_error(&err));
    }

    #[test]
    fn client_status_errors_classify_non_retryable() {
        let err = anyhow::Error::new(ClientError::Status {
            service: "template service",
            status: 404,
            body: "no such template".into(),
        });
        assert!(!is_retryable_error(&err));
    }

    #[test]
    fn timeouts_classify_retryable() {
        let err = anyhow::Error::new(ClientError::Timeout { service: "user service" });
        assert!(is_retryable_error(&err));
    }

    #[test]
    fn breaker_sentinels_classify_non_retryable() {
        let open = anyhow::Error::new(ClientError::Unavailable { service: "user service" });
        assert!(!is_retryable_error(&open));

        let probing = anyhow::Error::new(ClientError::Recovering { service: "user service" });
        assert!(!is_retryable_error(&probing));
    }

    #[test]
    fn sentinel_errors_remain_downcastable() {
        let err = anyhow::Error::new(ClientError::Unavailable { service: "user service" })
            .context("failed to get user preferences");

        assert!(matches!(
            err.downcast_ref::<ClientError>(),
            Some(ClientError::Unavailable { .. })
        ));
    }
}
