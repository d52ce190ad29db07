//! Structured logging initialization shared by the service binaries.
//!
//! Honors `RUST_LOG` when set; otherwise falls back to the configured
//! level. The format switch selects JSON output for production or a
//! human-readable console layout for development.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// # Panics
///
/// Panics if the level filter cannot be parsed; this runs once at process
/// startup before any work is accepted.
pub fn init(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .expect("invalid log level filter");

    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
