//! HTTP ingress, external-service clients, and the orchestration pipeline.
//!
//! Provides the REST endpoints for notification creation and status
//! callbacks, the idempotency layer guarding the ingress boundary, the
//! breaker-wrapped clients for the user and template services, and the
//! request-scoped pipeline that coordinates them all.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clients;
pub mod config;
pub mod handlers;
pub mod idempotency;
pub mod logging;
pub mod orchestration;
pub mod server;

pub use config::Config;
pub use handlers::AppState;
pub use idempotency::{IdempotencyCache, RedisIdempotencyCache};
pub use orchestration::{JobPublisher, Orchestrator};
pub use server::{create_router, start_server};
