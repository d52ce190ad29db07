//! Health probe handlers.
//!
//! Liveness reports on the process itself; readiness additionally pings the
//! store with a 2 second deadline so orchestration platforms stop routing
//! traffic when persistence is down.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, instrument};

use super::AppState;

/// Handles `GET /health/live` (and its `/health` alias).
#[instrument(name = "liveness_check")]
pub async fn live() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok", "timestamp": Utc::now() }))).into_response()
}

/// Handles `GET /health/ready`.
///
/// Returns 200 only when the store ping succeeds within its deadline, else
/// 503 with the failing check marked.
#[instrument(name = "readiness_check", skip(state))]
pub async fn ready(State(state): State<AppState>) -> Response {
    debug!("performing readiness check");

    match state.storage.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": {
                    "database": "ok",
                    "user_service": "ok",
                    "template_service": "ok",
                    "queue": "ok",
                },
                "timestamp": Utc::now(),
            })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not_ready",
                    "checks": {
                        "database": "error",
                        "user_service": "ok",
                        "template_service": "ok",
                        "queue": "ok",
                    },
                    "timestamp": Utc::now(),
                    "error": "database connection failed",
                })),
            )
                .into_response()
        },
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn liveness_always_succeeds() {
        let router = Router::new().route("/health/live", get(live));

        let response = router
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert!(body.get("timestamp").is_some());
    }
}
