//! Per-message processing: deserialize, send under breaker and retry,
//! report the terminal outcome.
//!
//! Poison containment happens here: a payload that fails to parse is logged
//! and skipped so one bad message can never wedge the topic. Send attempts
//! run inside the SMTP circuit breaker and the whole call sits under the
//! retry engine's cumulative budget; whatever the outcome, a status callback
//! tells the orchestrator how the notification ended.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use herald_core::models::{DeliveryJob, NotificationStatus, StatusUpdate};
use herald_resilience::{
    retry_for, BreakerConfig, CircuitBreaker, RetryConfig, TripPolicy,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    callback::StatusReporter,
    sender::{EmailMessage, EmailSender},
};

/// Metadata key carrying the recipient address.
const RECIPIENT_KEY: &str = "recipient";

/// Terminal outcome of processing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The email was sent and the callback posted `delivered`.
    Delivered,
    /// The send failed terminally and the callback posted `failed`.
    Failed,
    /// The message was poison (unparseable) and was skipped.
    Skipped,
}

/// Processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Backoff applied between send attempts.
    pub retry: RetryConfig,
    /// Cumulative retry budget per job.
    pub budget: Duration,
    /// Recipient used when the job's metadata carries none.
    pub fallback_recipient: Option<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::smtp(),
            budget: Duration::from_secs(300),
            fallback_recipient: None,
        }
    }
}

/// Builds the SMTP breaker: ratio-tripped because SMTP errors arrive in
/// batched bursts, with a minute of cool-down and five half-open probes.
fn smtp_breaker() -> CircuitBreaker {
    CircuitBreaker::new(
        BreakerConfig::new("smtp")
            .with_max_failures(5)
            .with_timeout(Duration::from_secs(60))
            .with_half_open_max(5)
            .with_trip_policy(TripPolicy::FailureRatio {
                min_requests: 10,
                failure_ratio: 0.6,
                window: Duration::from_secs(30),
            }),
    )
}

/// Email job processor.
pub struct EmailProcessor {
    sender: Arc<dyn EmailSender>,
    reporter: Arc<dyn StatusReporter>,
    breaker: CircuitBreaker,
    config: ProcessorConfig,
}

impl EmailProcessor {
    /// Creates a processor over the sender and reporter seams.
    pub fn new(
        sender: Arc<dyn EmailSender>,
        reporter: Arc<dyn StatusReporter>,
        config: ProcessorConfig,
    ) -> Self {
        Self { sender, reporter, breaker: smtp_breaker(), config }
    }

    /// Processes one raw message payload.
    pub async fn process(&self, cancel: &CancellationToken, payload: &[u8]) -> ProcessOutcome {
        let job: DeliveryJob = match serde_json::from_slice(payload) {
            Ok(job) => job,
            Err(err) => {
                warn!(
                    error = %err,
                    payload = %String::from_utf8_lossy(&payload[..payload.len().min(256)]),
                    "skipping unparseable message"
                );
                return ProcessOutcome::Skipped;
            },
        };

        info!(
            notification_id = %job.notification_id,
            user_id = %job.user_id,
            template_code = %job.template_code,
            "processing delivery job"
        );

        let Some(recipient) = self.resolve_recipient(&job) else {
            error!(notification_id = %job.notification_id, "job has no recipient address");
            self.report(&job, NotificationStatus::Failed, Some("no recipient address".into()))
                .await;
            return ProcessOutcome::Failed;
        };

        let email = EmailMessage {
            to: recipient,
            subject: job.subject.clone().unwrap_or_default(),
            html_body: job.body.clone(),
            text_body: job.text_body.clone(),
        };

        let send_result = retry_for(cancel, &self.config.retry, self.config.budget, || async {
            self.breaker
                .execute(|| self.sender.send(&email))
                .await
                .map_err(anyhow::Error::new)
        })
        .await;

        match send_result {
            Ok(()) => {
                info!(notification_id = %job.notification_id, "email delivered");
                self.report(&job, NotificationStatus::Delivered, None).await;
                ProcessOutcome::Delivered
            },
            Err(err) => {
                error!(
                    notification_id = %job.notification_id,
                    error = %format!("{err:#}"),
                    "email delivery failed terminally"
                );
                self.report(&job, NotificationStatus::Failed, Some(format!("{err:#}"))).await;
                ProcessOutcome::Failed
            },
        }
    }

    fn resolve_recipient(&self, job: &DeliveryJob) -> Option<String> {
        job.metadata
            .as_ref()
            .and_then(|meta| meta.get_str(RECIPIENT_KEY))
            .map(str::to_string)
            .or_else(|| self.config.fallback_recipient.clone())
    }

    async fn report(&self, job: &DeliveryJob, status: NotificationStatus, error: Option<String>) {
        let update = StatusUpdate {
            notification_id: job.notification_id,
            status,
            timestamp: Utc::now(),
            error,
        };

        if let Err(err) = self.reporter.report(&update).await {
            error!(
                notification_id = %job.notification_id,
                error = %err,
                "failed to post status callback"
            );
        }
    }
}
