//! Account registration endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use crate::auth::{self, RegisterOutcome};

use super::session::session_response;
use super::state::AuthState;
use super::types::{RegisterRequest, VerificationPendingResponse};
use super::utils::{device_context, normalize_email, strong_password, valid_email};

/// Register a new account.
///
/// A duplicate email gets the same "verification pending" response as a
/// fresh registration, so the endpoint cannot be used to probe for accounts.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Session issued (verification disabled) or verification pending", body = VerificationPendingResponse),
        (status = 400, description = "Invalid email or weak password", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email address".to_string()).into_response();
    }
    if !strong_password(&request.password) {
        return (
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters and include upper and lower case letters, a digit, and a special character".to_string(),
        )
            .into_response();
    }

    let device = device_context(&headers, request.fingerprint.as_deref());
    let outcome = auth_state
        .service()
        .register(
            auth::RegisterRequest {
                email,
                password: request.password,
                first_name: trimmed(request.first_name),
                last_name: trimmed(request.last_name),
            },
            &device,
        )
        .await;

    match outcome {
        Ok(RegisterOutcome::VerificationPending { email }) => (
            StatusCode::OK,
            Json(VerificationPendingResponse {
                message: "Verification code sent".to_string(),
                verification_required: true,
                email,
                fingerprint: device.fingerprint,
            }),
        )
            .into_response(),
        Ok(RegisterOutcome::Authenticated(session)) => session_response(&auth_state, session),
        Err(err) => {
            error!("Registration failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response()
        }
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
