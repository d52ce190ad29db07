//! Status callback client posting delivery outcomes to the orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use herald_core::models::StatusUpdate;
use reqwest::StatusCode;
use tracing::{debug, error};

use crate::error::{DeliveryError, Result};

/// Reporter contract used by the processor.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Posts one status update.
    async fn report(&self, update: &StatusUpdate) -> Result<()>;
}

/// HTTP reporter targeting the orchestrator's status endpoint.
pub struct HttpStatusReporter {
    http: reqwest::Client,
    base_url: String,
}

impl HttpStatusReporter {
    /// Creates a reporter for the orchestrator at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::configuration(e.to_string()))?;

        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl StatusReporter for HttpStatusReporter {
    async fn report(&self, update: &StatusUpdate) -> Result<()> {
        let url = format!(
            "{}/api/v1/notifications/{}/status",
            self.base_url, update.notification_id
        );

        debug!(
            notification_id = %update.notification_id,
            status = %update.status,
            "posting status callback"
        );

        let response = self
            .http
            .post(&url)
            .json(update)
            .send()
            .await
            .map_err(|e| DeliveryError::callback(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            error!(
                notification_id = %update.notification_id,
                status_code = status.as_u16(),
                response_body = %body,
                "status callback rejected"
            );
            return Err(DeliveryError::callback(format!(
                "orchestrator returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use herald_core::models::{NotificationId, NotificationStatus};
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn update(id: NotificationId) -> StatusUpdate {
        StatusUpdate {
            notification_id: id,
            status: NotificationStatus::Delivered,
            timestamp: Utc::now(),
            error: None,
        }
    }

    #[tokio::test]
    async fn posts_to_status_endpoint() {
        let server = MockServer::start().await;
        let id = NotificationId::new();

        Mock::given(matchers::method("POST"))
            .and(matchers::path(format!("/api/v1/notifications/{id}/status")))
            .and(matchers::body_partial_json(serde_json::json!({
                "notification_id": id,
                "status": "delivered",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reporter =
            HttpStatusReporter::new(server.uri(), Duration::from_secs(2)).unwrap();
        reporter.report(&update(id)).await.unwrap();
    }

    #[tokio::test]
    async fn non_200_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("store down"))
            .mount(&server)
            .await;

        let reporter =
            HttpStatusReporter::new(server.uri(), Duration::from_secs(2)).unwrap();
        let err = reporter.report(&update(NotificationId::new())).await.unwrap_err();

        assert!(err.to_string().contains("status 500"));
    }
}
