//! HTTP client for the user preference service.

use std::time::Duration;

use async_trait::async_trait;
use herald_core::models::UserPreferences;
use herald_resilience::{retry, BreakerConfig, BreakerError, CircuitBreaker, RetryConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{ClientError, UserApi};

const SERVICE: &str = "user service";

/// Configuration for the user service client.
#[derive(Debug, Clone)]
pub struct UserClientConfig {
    /// Base URL of the user service.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Breaker settings for this dependency.
    pub breaker: BreakerConfig,
    /// Retry settings applied outside the breaker.
    pub retry: RetryConfig,
}

impl Default for UserClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://user-service:8081".to_string(),
            timeout: Duration::from_secs(10),
            breaker: BreakerConfig::new("user-service"),
            retry: RetryConfig::default(),
        }
    }
}

/// User service client with a dedicated circuit breaker.
pub struct HttpUserClient {
    base_url: String,
    http: reqwest::Client,
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl HttpUserClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: UserClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build().map_err(|e| {
            ClientError::Configuration { service: SERVICE, message: e.to_string() }
        })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            breaker: CircuitBreaker::new(config.breaker),
            retry: config.retry,
        })
    }

    async fn fetch_preferences(&self, user_id: &str) -> Result<UserPreferences, ClientError> {
        let url = format!("{}/api/v1/users/{}/preferences", self.base_url, user_id);

        debug!(url = %url, user_id, "calling user service");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(user_id, error = %e, "user service request failed");
                ClientError::from_transport(SERVICE, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                status_code = status.as_u16(),
                user_id,
                response_body = %body,
                "user service returned non-2xx status"
            );
            return Err(ClientError::Status { service: SERVICE, status: status.as_u16(), body });
        }

        response
            .json::<UserPreferences>()
            .await
            .map_err(|source| ClientError::Decode { service: SERVICE, source })
    }
}

#[async_trait]
impl UserApi for HttpUserClient {
    async fn get_preferences(&self, user_id: &str) -> anyhow::Result<UserPreferences> {
        let cancel = CancellationToken::new();

        retry(&cancel, &self.retry, || async {
            let result = self.breaker.execute(|| self.fetch_preferences(user_id)).await;

            match result {
                Ok(prefs) => Ok(prefs),
                Err(BreakerError::CircuitOpen) => {
                    warn!(user_id, "user service circuit breaker is open");
                    Err(anyhow::Error::new(ClientError::Unavailable { service: SERVICE }))
                },
                Err(BreakerError::TooManyProbes) => {
                    warn!(user_id, "user service circuit breaker: too many half-open probes");
                    Err(anyhow::Error::new(ClientError::Recovering { service: SERVICE }))
                },
                Err(BreakerError::Operation(err)) => Err(anyhow::Error::new(err)),
            }
        })
        .await
    }
}
