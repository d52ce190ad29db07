//! HTTP request handlers for the orchestrator's ingress surface.
//!
//! Provides the notification creation endpoint, the worker status callback,
//! the user validation passthrough, and the health probes. All endpoints
//! respond with the shared `ApiResponse` envelope; failure bodies carry no
//! stack traces or internal identifiers.

pub mod health;
pub mod notifications;
pub mod status;
pub mod users;

use std::sync::Arc;

use herald_core::Storage;
use serde::Serialize;

use crate::{idempotency::IdempotencyCache, orchestration::Orchestrator};

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Orchestration pipeline.
    pub orchestrator: Arc<Orchestrator>,
    /// Idempotency cache for the ingress boundary.
    pub idempotency: Arc<dyn IdempotencyCache>,
    /// Storage, used by the readiness probe.
    pub storage: Arc<Storage>,
}

impl AppState {
    /// Creates the shared state.
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        idempotency: Arc<dyn IdempotencyCache>,
        storage: Arc<Storage>,
    ) -> Self {
        Self { orchestrator, idempotency, storage }
    }
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was handled successfully.
    pub success: bool,
    /// Human-readable outcome description.
    pub message: String,
    /// Endpoint-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure detail, absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Builds a success envelope with a payload.
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self { success: true, message: message.into(), data: Some(data), error: None }
    }

    /// Builds a failure envelope.
    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), data: None, error: Some(error.into()) }
    }
}
