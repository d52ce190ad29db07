//! Notification creation handler.
//!
//! Binds the ingress payload, applies the idempotency check, delegates to
//! the orchestration pipeline, and caches the response. Duplicate
//! submissions replay the original response with `X-Idempotent-Replay: true`
//! and a 200 status; cache I/O failures are soft and never block a request.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use herald_core::models::{NotificationRequest, NotificationResponse, NotificationStatus};
use tracing::{error, info, instrument, warn};

use super::{ApiResponse, AppState};

/// Header set on idempotent replays.
const IDEMPOTENT_REPLAY_HEADER: &str = "X-Idempotent-Replay";

/// Handles `POST /api/v1/notifications`.
///
/// Responses: 201 on new processing, 200 with the replay header on cache
/// hits, 200 with domain `status = failed` for channel opt-outs, 400 on
/// validation failure, 500 on pipeline failure.
#[instrument(name = "create_notification", skip(state, payload))]
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<NotificationRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "invalid request payload");
            return validation_error(rejection.body_text());
        },
    };

    if let Err(field) = request.validate() {
        warn!(field, "request rejected: missing required field");
        return validation_error(format!("missing required field: {field}"));
    }

    // Idempotency check. I/O errors are soft: log and process normally.
    match state.idempotency.get(&request.request_id).await {
        Ok(Some(cached)) => {
            info!(request_id = %request.request_id, "returning cached response");
            return replay_response(cached);
        },
        Ok(None) => {},
        Err(err) => {
            warn!(
                request_id = %request.request_id,
                error = %err,
                "idempotency lookup failed, processing without cache"
            );
        },
    }

    let response = match state.orchestrator.process(&request).await {
        Ok(response) => response,
        Err(err) => {
            error!(
                request_id = %request.request_id,
                error = %format!("{err:#}"),
                "failed to process notification"
            );
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<NotificationResponse>::failure(
                    "Failed to process notification",
                    format!("{err:#}"),
                )),
            )
                .into_response();
        },
    };

    // Cache only queued outcomes; opt-outs stop before the cache step.
    if response.status == NotificationStatus::Pending {
        if let Err(err) = state.idempotency.put(&request.request_id, &response).await {
            warn!(
                request_id = %request.request_id,
                error = %err,
                "failed to store idempotency entry"
            );
        }
    }

    if response.status == NotificationStatus::Failed {
        (StatusCode::OK, Json(ApiResponse::success("Notification processed", response)))
            .into_response()
    } else {
        (
            StatusCode::CREATED,
            Json(ApiResponse::success("Notification queued successfully", response)),
        )
            .into_response()
    }
}

fn validation_error(detail: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<NotificationResponse>::failure("Invalid request payload", detail)),
    )
        .into_response()
}

fn replay_response(cached: NotificationResponse) -> Response {
    let mut response = (
        StatusCode::OK,
        Json(ApiResponse::success("Notification retrieved from cache", cached)),
    )
        .into_response();

    if let Ok(value) = "true".parse() {
        response.headers_mut().insert(IDEMPOTENT_REPLAY_HEADER, value);
    }

    response
}
