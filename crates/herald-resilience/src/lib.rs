//! Resilience primitives shared by Herald's outbound dependencies.
//!
//! Provides the three-state circuit breaker fronting every outbound HTTP
//! dependency and the SMTP sender, plus the exponential-backoff retry engine
//! with its retryable-error taxonomy. The breaker shields a dependency; the
//! retry engine is layered outside it by callers that want bounded retries.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit;
pub mod retry;

pub use circuit::{BreakerConfig, BreakerError, CircuitBreaker, CircuitState, TripPolicy};
pub use retry::{is_retryable_error, is_retryable_status, retry, retry_for, RetryConfig};
