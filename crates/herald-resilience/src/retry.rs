//! Exponential backoff retry engine with retryable-error classification.
//!
//! Implements the bounded retry loop used around every outbound dependency.
//! Delays grow as `initial_delay * multiplier^(attempt-1)` capped at
//! `max_delay`; cancellation is observed before each attempt and during each
//! sleep. Non-retryable errors short-circuit the loop immediately.

use std::time::{Duration, Instant};

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Textual error patterns treated as transient, matched case-insensitively
/// against the full error chain. `status 5` is the 5xx-prefix sentinel.
const RETRYABLE_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timeout",
    "no such host",
    "network is unreachable",
    "timeout",
    "temporary failure",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
    "internal server error",
    "status 5",
];

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries; the operation runs at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap applied to every computed delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff tuned for SMTP delivery: slower first retry, minute-scale cap.
    /// Pair with [`retry_for`] and a cumulative budget.
    pub fn smtp() -> Self {
        Self {
            max_retries: u32::MAX,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

/// Executes `operation` with retry logic and exponential backoff.
///
/// Retries only errors classified retryable by [`is_retryable_error`]; a
/// non-retryable failure is returned immediately. After exhausting
/// `max_retries`, the last error is wrapped with a `max retries exceeded`
/// prefix. A cancelled token yields immediately with a cancellation error.
pub async fn retry<F, Fut, T>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    mut operation: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    for attempt in 0..=config.max_retries {
        if cancel.is_cancelled() {
            return Err(anyhow!("operation cancelled"));
        }

        if attempt > 0 {
            let delay = backoff_delay(config, attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying operation");

            tokio::select! {
                () = cancel.cancelled() => return Err(anyhow!("operation cancelled")),
                () = tokio::time::sleep(delay) => {},
            }
        }

        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            },
            Err(err) => {
                if !is_retryable_error(&err) {
                    debug!(error = %err, "error is not retryable, stopping retries");
                    return Err(err);
                }

                if attempt == config.max_retries {
                    warn!(
                        max_retries = config.max_retries,
                        error = %err,
                        "max retries reached, operation failed"
                    );
                    return Err(
                        err.context(format!("max retries ({}) exceeded", config.max_retries))
                    );
                }
            },
        }
    }

    Err(anyhow!("retry loop exited without running the operation"))
}

/// Executes `operation` under a cumulative time budget, retrying every
/// failure.
///
/// Used by the delivery worker, where each attempt already passed through a
/// circuit breaker and the terminal condition is elapsed time rather than an
/// attempt count. Gives up once the next backoff sleep would overrun the
/// budget, wrapping the last error with a `retry budget exhausted` prefix.
pub async fn retry_for<F, Fut, T>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    budget: Duration,
    mut operation: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(anyhow!("operation cancelled"));
        }

        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            },
            Err(err) => {
                let delay = backoff_delay(config, attempt);
                if started.elapsed() + delay >= budget {
                    warn!(
                        attempt,
                        budget_secs = budget.as_secs(),
                        error = %err,
                        "retry budget exhausted"
                    );
                    return Err(
                        err.context(format!("retry budget ({}s) exhausted", budget.as_secs()))
                    );
                }

                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "backing off");
                tokio::select! {
                    () = cancel.cancelled() => return Err(anyhow!("operation cancelled")),
                    () = tokio::time::sleep(delay) => {},
                }
            },
        }
    }
}

/// Computes the delay preceding retry `attempt` (1-based).
fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32);
    let delay =
        config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent as i32);

    Duration::from_secs_f64(delay.min(config.max_delay.as_secs_f64()))
}

/// Determines whether an error should be retried.
///
/// An error is retryable iff it exposes a transport timeout or connect
/// failure, or its textual form matches one of the transient patterns. The
/// full `anyhow` chain is inspected so wrapped causes still classify.
pub fn is_retryable_error(err: &anyhow::Error) -> bool {
    if let Some(transport) = err.downcast_ref::<reqwest::Error>() {
        if transport.is_timeout() || transport.is_connect() {
            return true;
        }
    }

    let message = format!("{err:#}").to_lowercase();
    RETRYABLE_PATTERNS.iter().any(|pattern| message.contains(pattern))
}

/// Classifies an HTTP status code: retryable iff 5xx or 429.
pub const fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(8),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let cancel = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let result = retry(&cancel, &fast_config(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let cancel = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let result = retry(&cancel, &fast_config(), || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(anyhow!("service unavailable"))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_short_circuits() {
        let cancel = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let result: anyhow::Result<()> = retry(&cancel, &fast_config(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("template not found"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_wraps_last_error() {
        let cancel = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let result: anyhow::Result<()> = retry(&cancel, &fast_config(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("status 503: service unavailable"))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 4, "max_retries + 1 invocations");
        assert!(format!("{err:#}").contains("max retries (3) exceeded"));
    }

    #[tokio::test]
    async fn cancelled_token_yields_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let attempts = AtomicU32::new(0);

        let result: anyhow::Result<()> = retry(&cancel, &fast_config(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("timeout"))
        })
        .await;

        assert!(result.unwrap_err().to_string().contains("cancelled"));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff_sleep() {
        let cancel = CancellationToken::new();
        let config = RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        };

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result: anyhow::Result<()> =
            retry(&cancel, &config, || async { Err(anyhow!("timeout")) }).await;

        assert!(result.unwrap_err().to_string().contains("cancelled"));
        assert!(started.elapsed() < Duration::from_secs(1), "terminates within one sleep quantum");
    }

    #[tokio::test]
    async fn budgeted_retry_gives_up_after_budget() {
        let cancel = CancellationToken::new();
        let config = RetryConfig {
            max_retries: u32::MAX,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        };
        let attempts = AtomicU32::new(0);

        let result: anyhow::Result<()> =
            retry_for(&cancel, &config, Duration::from_millis(40), || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("permanent smtp refusal"))
            })
            .await;

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("retry budget"));
        assert!(attempts.load(Ordering::SeqCst) >= 2, "retries every error until the budget");
    }

    #[tokio::test]
    async fn budgeted_retry_returns_first_success() {
        let cancel = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let result = retry_for(&cancel, &RetryConfig::smtp(), Duration::from_secs(300), || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(anyhow!("greeting failed"))
            } else {
                Ok("sent")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "sent");
    }

    #[test]
    fn backoff_sequence_is_non_decreasing_and_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        };

        let delays: Vec<Duration> = (1..=10).map(|a| backoff_delay(&config, a)).collect();

        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        for pair in delays.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(5)));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn textual_patterns_classify_case_insensitively() {
        assert!(is_retryable_error(&anyhow!("Connection Refused by peer")));
        assert!(is_retryable_error(&anyhow!("read: connection reset")));
        assert!(is_retryable_error(&anyhow!("dial: no such host")));
        assert!(is_retryable_error(&anyhow!("Network is unreachable")));
        assert!(is_retryable_error(&anyhow!("request timeout")));
        assert!(is_retryable_error(&anyhow!("502 Bad Gateway")));
        assert!(is_retryable_error(&anyhow!("returned status 503")));
        assert!(is_retryable_error(&anyhow!("user service returned status 500: boom")));

        assert!(!is_retryable_error(&anyhow!("template not found")));
        assert!(!is_retryable_error(&anyhow!("returned status 404: missing")));
        assert!(!is_retryable_error(&anyhow!("invalid payload")));
    }

    #[test]
    fn wrapped_causes_still_classify() {
        let inner = anyhow!("connection refused");
        let wrapped = inner.context("failed to fetch preferences");
        assert!(is_retryable_error(&wrapped));
    }

    #[test]
    fn status_codes_classify() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }
}
