//! Status callback handler for delivery workers.
//!
//! Accepts `POST /api/v1/notifications/{id}/status` from channel workers
//! reporting a terminal delivery outcome. The body is authoritative: the
//! path segment is accepted for routing but the record is addressed by the
//! body's `notification_id`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use herald_core::models::StatusUpdate;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use super::{ApiResponse, AppState};

/// Handles `POST /api/v1/notifications/{id}/status`.
///
/// Returns 200 on update, 400 on payload or status violations, 500 on store
/// failure.
#[instrument(name = "update_notification_status", skip(state, payload))]
pub async fn update(
    State(state): State<AppState>,
    Path(_path_id): Path<String>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Response {
    let update = match payload {
        Ok(Json(update)) => update,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "invalid status update payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<serde_json::Value>::failure(
                    "Invalid request payload",
                    rejection.body_text(),
                )),
            )
                .into_response();
        },
    };

    info!(
        notification_id = %update.notification_id,
        status = %update.status,
        "updating notification status"
    );

    if let Err(err) = state
        .orchestrator
        .update_status(update.notification_id, update.status, update.error.as_deref())
        .await
    {
        error!(
            notification_id = %update.notification_id,
            error = %err,
            "failed to update notification status"
        );
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<serde_json::Value>::failure(
                "Failed to update notification status",
                err.to_string(),
            )),
        )
            .into_response();
    }

    info!(
        notification_id = %update.notification_id,
        status = %update.status,
        "notification status updated successfully"
    );

    (
        StatusCode::OK,
        Json(ApiResponse::success(
            format!("Status updated for notification {}: {}", update.notification_id, update.status),
            json!({
                "notification_id": update.notification_id,
                "status": update.status,
                "updated_at": Utc::now(),
            }),
        )),
    )
        .into_response()
}
