//! HTTP client for the template service.

use std::time::Duration;

use async_trait::async_trait;
use herald_core::models::{JsonMap, RenderResponse, Template};
use herald_resilience::{retry, BreakerConfig, BreakerError, CircuitBreaker, RetryConfig};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{ClientError, TemplateApi};

const SERVICE: &str = "template service";

/// Render request body sent to the template service.
#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    language: &'a str,
    version: &'a str,
    variables: &'a JsonMap,
    preview_mode: bool,
}

/// Configuration for the template service client.
#[derive(Debug, Clone)]
pub struct TemplateClientConfig {
    /// Base URL of the template service.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Breaker settings for this dependency.
    pub breaker: BreakerConfig,
    /// Retry settings applied outside the breaker.
    pub retry: RetryConfig,
}

impl Default for TemplateClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://template-service:8082".to_string(),
            timeout: Duration::from_secs(10),
            breaker: BreakerConfig::new("template-service"),
            retry: RetryConfig::default(),
        }
    }
}

/// Template service client with a dedicated circuit breaker.
pub struct HttpTemplateClient {
    base_url: String,
    http: reqwest::Client,
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl HttpTemplateClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: TemplateClientConfig) -> Result<Self, ClientError> {
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

    async fn fetch_template(
        &self,
        template_id: &str,
        language: &str,
    ) -> Result<Template, ClientError> {
        let url =
            format!("{}/api/v1/templates/{}?language={}", self.base_url, template_id, language);

        debug!(url = %url, template_id, language, "calling template service");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(template_id, error = %e, "template service request failed");
                ClientError::from_transport(SERVICE, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                status_code = status.as_u16(),
                template_id,
                response_body = %body,
                "template service returned non-2xx status"
            );
            return Err(ClientError::Status { service: SERVICE, status: status.as_u16(), body });
        }

        response
            .json::<Template>()
            .await
            .map_err(|source| ClientError::Decode { service: SERVICE, source })
    }

    async fn render(
        &self,
        template_id: &str,
        language: &str,
        variables: &JsonMap,
    ) -> Result<RenderResponse, ClientError> {
        let url = format!("{}/api/v1/templates/{}/render", self.base_url, template_id);
        let body = RenderRequest { language, version: "latest", variables, preview_mode: false };

        debug!(url = %url, template_id, language, "rendering template");

        let response = self.http.post(&url).json(&body).send().await.map_err(|e| {
            error!(template_id, error = %e, "template render request failed");
            ClientError::from_transport(SERVICE, e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                status_code = status.as_u16(),
                template_id,
                response_body = %body,
                "template render returned non-2xx status"
            );
            return Err(ClientError::Status { service: SERVICE, status: status.as_u16(), body });
        }

        response
            .json::<RenderResponse>()
            .await
            .map_err(|source| ClientError::Decode { service: SERVICE, source })
    }

    async fn guarded<T, F, Fut>(&self, template_id: &str, operation: F) -> anyhow::Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ClientError>>,
    {
        let cancel = CancellationToken::new();

        retry(&cancel, &self.retry, || async {
            match self.breaker.execute(&operation).await {
                Ok(value) => Ok(value),
                Err(BreakerError::CircuitOpen) => {
                    warn!(template_id, "template service circuit breaker is open");
                    Err(anyhow::Error::new(ClientError::Unavailable { service: SERVICE }))
                },
                Err(BreakerError::TooManyProbes) => {
                    warn!(template_id, "template service circuit breaker: too many half-open probes");
                    Err(anyhow::Error::new(ClientError::Recovering { service: SERVICE }))
                },
                Err(BreakerError::Operation(err)) => Err(anyhow::Error::new(err)),
            }
        })
        .await
    }
}

#[async_trait]
impl TemplateApi for HttpTemplateClient {
    async fn get_template(&self, template_id: &str, language: &str) -> anyhow::Result<Template> {
        self.guarded(template_id, || self.fetch_template(template_id, language)).await
    }

    async fn render_template(
        &self,
        template_id: &str,
        language: &str,
        variables: &JsonMap,
    ) -> anyhow::Result<RenderResponse> {
        self.guarded(template_id, || self.render(template_id, language, variables)).await
    }
}

#[cfg(test)]
mod tests {
    use herald_resilience::CircuitState;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_client(base_url: String) -> HttpTemplateClient {
        let config = TemplateClientConfig {
            base_url,
            timeout: Duration::from_secs(2),
            breaker: BreakerConfig::new("template-service").with_max_failures(5),
            retry: RetryConfig {
                max_retries: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
                backoff_multiplier: 2.0,
            },
        };
        HttpTemplateClient::new(config).expect("client should build")
    }

    #[tokio::test]
    async fn renders_template() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/v1/templates/welcome/render"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "template_id": "welcome",
                "language": "en",
                "version": "latest",
                "rendered": {
                    "subject": "Welcome!",
                    "body": {"html": "<p>Hello A!</p>", "text": "Hello A!"}
                },
                "variables_used": ["name"]
            })))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let mut variables = serde_json::Map::new();
        variables.insert("name".into(), serde_json::Value::String("A".into()));

        let rendered =
            client.render_template("welcome", "en", &JsonMap(variables)).await.unwrap();

        assert_eq!(rendered.rendered.body.text, "Hello A!");
        assert_eq!(rendered.rendered.subject, "Welcome!");
    }

    #[tokio::test]
    async fn render_sends_language_and_variables() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/v1/templates/welcome/render"))
            .and(matchers::body_partial_json(serde_json::json!({
                "language": "en",
                "variables": {"name": "A"},
                "preview_mode": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "template_id": "welcome",
                "language": "en",
                "rendered": {"body": {"text": "Hello A!"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let mut variables = serde_json::Map::new();
        variables.insert("name".into(), serde_json::Value::String("A".into()));

        client.render_template("welcome", "en", &JsonMap(variables)).await.unwrap();
    }

    #[tokio::test]
    async fn persistent_503_exhausts_retries_then_opens_breaker() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = test_client(server.uri());

        // First request: 4 attempts, all failing.
        let err = client
            .render_template("welcome", "en", &JsonMap::new())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("max retries (3) exceeded"));
        assert_eq!(client.breaker.state(), CircuitState::Closed);

        // Second request pushes the consecutive failure count past five.
        let _ = client.render_template("welcome", "en", &JsonMap::new()).await;
        assert_eq!(client.breaker.state(), CircuitState::Open);

        // Subsequent requests fail fast with the unavailable mapping.
        let err = client
            .render_template("welcome", "en", &JsonMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("temporarily unavailable"));
    }

    #[tokio::test]
    async fn fetches_template_catalog_entry() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/v1/templates/welcome"))
            .and(matchers::query_param("language", "en"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "template_id": "welcome",
                "name": "Welcome Email",
                "version": "2.3.0",
                "language": "en",
                "type": "email",
                "subject": "Welcome, {{name}}!",
                "body": {"html": "<h1>Hi {{name}}</h1>", "text": "Hi {{name}}"},
                "variables": [
                    {"name": "name", "type": "string", "required": true, "description": ""}
                ]
            })))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let template = client.get_template("welcome", "en").await.unwrap();

        assert_eq!(template.template_id, "welcome");
        assert_eq!(template.kind, "email");
        assert_eq!(template.variables.len(), 1);
    }
}
