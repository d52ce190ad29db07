//! Circuit breaker implementation for outbound dependency protection.
//!
//! Provides a per-dependency breaker that fails fast during outages and
//! gradually tests recovery. Each breaker protects exactly one logical
//! dependency; instances are never shared between dependencies.
//!
//! # State Machine
//!
//! ```text
//!                 max_failures reached            timeout elapsed
//!      CLOSED ──────────────────────────▶ OPEN ──────────────────▶ HALF-OPEN
//!        ▲                                  ▲                          │
//!        │   max_failures successes         │      any failure        │
//!        └──────────────────────────────────┴──────────────────────────┘
//! ```
//!
//! The open state rejects calls with the [`BreakerError::CircuitOpen`]
//! sentinel without invoking the operation. Half-open admits a bounded
//! number of probes; excess probes receive [`BreakerError::TooManyProbes`].

use std::{
    sync::RwLock,
    time::{Duration, Instant},
};

use thiserror::Error;

/// Current state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests flow.
    Closed,
    /// Dependency unhealthy, requests fail immediately.
    Open,
    /// Testing recovery with a bounded number of probes.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
///
/// The two sentinel variants are produced without invoking the operation and
/// are preserved so callers can map them to distinct domain errors.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker is open; the operation was not invoked.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The half-open probe budget is exhausted; the operation was not
    /// invoked.
    #[error("too many requests in half-open state")]
    TooManyProbes,

    /// The operation ran and failed with its own error.
    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Whether this is one of the breaker's sentinel errors.
    pub const fn is_sentinel(&self) -> bool {
        matches!(self, Self::CircuitOpen | Self::TooManyProbes)
    }
}

/// Predicate deciding when a closed breaker trips open.
#[derive(Debug, Clone, PartialEq)]
pub enum TripPolicy {
    /// Open after `max_failures` consecutive failures. Suits HTTP
    /// dependencies whose errors arrive in isolation.
    ConsecutiveFailures,

    /// Open when the rolling window holds more than `min_requests` requests
    /// and the failure ratio exceeds `failure_ratio`. Suits SMTP, whose
    /// errors arrive in batched bursts.
    FailureRatio {
        /// Requests required in the window before the ratio is considered.
        min_requests: u32,
        /// Failure ratio (0.0 to 1.0) that trips the breaker.
        failure_ratio: f64,
        /// Length of the rolling measurement window.
        window: Duration,
    },
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Name of the protected dependency, used in logs.
    pub name: String,
    /// Failure threshold for tripping and the success target for closing
    /// from half-open.
    pub max_failures: u32,
    /// Cool-down before an open breaker admits a probe.
    pub timeout: Duration,
    /// Concurrent probes admitted while half-open.
    pub half_open_max: u32,
    /// Trip predicate applied in the closed state.
    pub trip_policy: TripPolicy,
}

impl BreakerConfig {
    /// Creates a configuration with the standard defaults for an HTTP
    /// dependency: five consecutive failures trip, 60 second cool-down,
    /// one half-open probe.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_failures: 5,
            timeout: Duration::from_secs(60),
            half_open_max: 1,
            trip_policy: TripPolicy::ConsecutiveFailures,
        }
    }

    /// Sets the failure threshold, keeping the Go-style zero-means-default
    /// convention out of callers' way.
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        if max_failures > 0 {
            self.max_failures = max_failures;
        }
        self
    }

    /// Sets the open-state cool-down.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Sets the half-open probe budget.
    pub fn with_half_open_max(mut self, half_open_max: u32) -> Self {
        if half_open_max > 0 {
            self.half_open_max = half_open_max;
        }
        self
    }

    /// Replaces the trip predicate.
    pub fn with_trip_policy(mut self, trip_policy: TripPolicy) -> Self {
        self.trip_policy = trip_policy;
        self
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    half_open_count: u32,
    last_fail_time: Option<Instant>,
    window_started: Instant,
    window_requests: u32,
    window_failures: u32,
}

/// Thread-safe circuit breaker around a single logical dependency.
///
/// State and counters live under a single lock held only across state reads
/// and counter updates, never across the protected operation. The breaker
/// may be shared across many concurrent callers.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a breaker with the given configuration.
    pub fn new(config: BreakerConfig) -> Self {
        tracing::info!(dependency = %config.name, "circuit breaker initialized");

        Self {
            config,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                half_open_count: 0,
                last_fail_time: None,
                window_started: Instant::now(),
                window_requests: 0,
                window_failures: 0,
            }),
        }
    }

    /// Runs `operation` if the breaker permits, records the outcome, and
    /// returns the result.
    ///
    /// Returns [`BreakerError::CircuitOpen`] or [`BreakerError::TooManyProbes`]
    /// without invoking the operation when the breaker rejects the call. No
    /// retries happen here; retrying is the caller's choice via the retry
    /// engine.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.before_request()?;

        let result = operation().await;
        self.after_request(result.is_ok());

        result.map_err(BreakerError::Operation)
    }

    /// Returns the current state under a shared lock.
    pub fn state(&self) -> CircuitState {
        self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner).state
    }

    /// Name of the protected dependency.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn before_request<E>(&self) -> Result<(), BreakerError<E>> {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);

        match inner.state {
            CircuitState::Open => {
                let cooled_down = inner
                    .last_fail_time
                    .is_some_and(|at| at.elapsed() > self.config.timeout);
                if cooled_down {
                    tracing::info!(
                        dependency = %self.config.name,
                        "circuit breaker attempting reset"
                    );
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_count = 0;
                    return Ok(());
                }
                tracing::warn!(
                    dependency = %self.config.name,
                    "circuit breaker is open, rejecting request"
                );
                Err(BreakerError::CircuitOpen)
            },
            CircuitState::HalfOpen => {
                if inner.half_open_count >= self.config.half_open_max {
                    Err(BreakerError::TooManyProbes)
                } else {
                    inner.half_open_count += 1;
                    Ok(())
                }
            },
            CircuitState::Closed => Ok(()),
        }
    }

    fn after_request(&self, succeeded: bool) {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);

        self.roll_window(&mut inner);
        inner.window_requests += 1;

        if succeeded {
            self.on_success(&mut inner);
        } else {
            inner.window_failures += 1;
            self.on_failure(&mut inner);
        }
    }

    fn on_success(&self, inner: &mut BreakerInner) {
        match inner.state {
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.max_failures {
                    tracing::info!(
                        dependency = %self.config.name,
                        "circuit breaker closed after successful recovery"
                    );
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.window_requests = 0;
                    inner.window_failures = 0;
                }
            },
            CircuitState::Closed => {
                inner.failures = 0;
            },
            CircuitState::Open => {},
        }
    }

    fn on_failure(&self, inner: &mut BreakerInner) {
        inner.failures += 1;
        inner.last_fail_time = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                tracing::warn!(
                    dependency = %self.config.name,
                    "circuit breaker reopened after failed recovery attempt"
                );
                inner.state = CircuitState::Open;
                inner.successes = 0;
            },
            CircuitState::Closed => {
                if self.should_trip(inner) {
                    tracing::warn!(
                        dependency = %self.config.name,
                        failures = inner.failures,
                        "circuit breaker opened"
                    );
                    inner.state = CircuitState::Open;
                }
            },
            CircuitState::Open => {},
        }
    }

    fn should_trip(&self, inner: &BreakerInner) -> bool {
        match self.config.trip_policy {
            TripPolicy::ConsecutiveFailures => inner.failures >= self.config.max_failures,
            TripPolicy::FailureRatio { min_requests, failure_ratio, .. } => {
                inner.window_requests > min_requests
                    && f64::from(inner.window_failures) / f64::from(inner.window_requests)
                        > failure_ratio
            },
        }
    }

    fn roll_window(&self, inner: &mut BreakerInner) {
        if let TripPolicy::FailureRatio { window, .. } = self.config.trip_policy {
            if inner.window_started.elapsed() > window {
                inner.window_started = Instant::now();
                inner.window_requests = 0;
                inner.window_failures = 0;
            }
        }
    }
}
