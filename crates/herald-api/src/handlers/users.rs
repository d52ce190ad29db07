//! User creation passthrough handler.
//!
//! Validates the registration payload and simulates the handoff to the user
//! service. Routing and validation live here; the actual user storage is an
//! external collaborator.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use herald_core::models::UserPreferences;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::ApiResponse;

/// Registration payload for `POST /api/v1/users`.
#[derive(Debug, Deserialize)]
pub struct UserCreationRequest {
    /// Display name.
    pub name: String,
    /// Contact email address.
    pub email: String,
    /// Optional push token for mobile delivery.
    #[serde(default)]
    pub push_token: Option<String>,
    /// Initial notification preferences.
    #[serde(default = "default_preferences")]
    pub preferences: UserPreferences,
    /// Account password.
    pub password: String,
}

fn default_preferences() -> UserPreferences {
    UserPreferences { email_enabled: false, push_enabled: false }
}

impl UserCreationRequest {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err("email must be a valid address".to_string());
        }
        if self.password.len() < 8 {
            return Err("password must be at least 8 characters".to_string());
        }
        Ok(())
    }
}

/// Handles `POST /api/v1/users`.
#[instrument(name = "create_user", skip(payload))]
pub async fn create(payload: Result<Json<UserCreationRequest>, JsonRejection>) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "invalid user creation payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<serde_json::Value>::failure(
                    "Invalid request payload for user creation",
                    rejection.body_text(),
                )),
            )
                .into_response();
        },
    };

    if let Err(detail) = request.validate() {
        warn!(error = %detail, "user creation payload failed validation");
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<serde_json::Value>::failure(
                "Invalid request payload for user creation",
                detail,
            )),
        )
            .into_response();
    }

    let user_id = Uuid::new_v4();

    info!(
        user_email = %request.email,
        email_pref = request.preferences.email_enabled,
        push_pref = request.preferences.push_enabled,
        "user creation request received and validated"
    );

    (
        StatusCode::CREATED,
        Json(ApiResponse::success(
            format!("User registration successful. User ID: {user_id}. Handed off to User Service."),
            json!({
                "name": request.name,
                "email": request.email,
                "push_token": request.push_token,
                "preferences": request.preferences,
            }),
        )),
    )
        .into_response()
}
