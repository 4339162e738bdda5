//! Password reset endpoints.
//!
//! Three steps: request a code, optionally pre-check it, then change the
//! password. The first step never reveals whether the email has an account.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use crate::auth::AuthError;

use super::state::AuthState;
use super::types::{
    ForgotPasswordRequest, MessageResponse, ResetPasswordRequest, VerifyResetCodeRequest,
};
use super::utils::{acceptable_reset_password, normalize_email, valid_code, valid_email};

const INVALID_CODE_MESSAGE: &str = "Invalid or expired verification code";
const FORGOT_MESSAGE: &str = "If this email exists, a code was sent";

/// Start a password reset (always a generic 200).
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset accepted", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let generic = || {
        (
            StatusCode::OK,
            Json(MessageResponse {
                message: FORGOT_MESSAGE.to_string(),
            }),
        )
            .into_response()
    };

    let request: ForgotPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return generic();
    }

    if let Err(err) = auth_state.service().request_password_reset(&email).await {
        // Delivery or storage trouble stays invisible to the caller.
        error!("Failed to start password reset: {err}");
    }
    generic()
}

/// Pre-check a reset code without consuming it.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-reset-code",
    request_body = VerifyResetCodeRequest,
    responses(
        (status = 204, description = "Code is valid"),
        (status = 400, description = "Invalid or expired verification code", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_reset_code(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyResetCodeRequest>>,
) -> impl IntoResponse {
    let request: VerifyResetCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    let code = request.code.trim();
    if !valid_email(&email) || !valid_code(code) {
        return (StatusCode::BAD_REQUEST, INVALID_CODE_MESSAGE.to_string()).into_response();
    }

    if auth_state.service().verify_reset_code(&email, code).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        // Missing account and wrong code are indistinguishable here.
        (StatusCode::BAD_REQUEST, INVALID_CODE_MESSAGE.to_string()).into_response()
    }
}

/// Change the password; consumes the reset code.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Invalid code or unacceptable password", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    let code = request.code.trim();
    if !valid_email(&email) || !valid_code(code) {
        return (StatusCode::BAD_REQUEST, INVALID_CODE_MESSAGE.to_string()).into_response();
    }
    if !acceptable_reset_password(&request.new_password) {
        return (
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters".to_string(),
        )
            .into_response();
    }

    match auth_state
        .service()
        .reset_password(&email, code, &request.new_password)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(AuthError::InvalidCode) => {
            (StatusCode::BAD_REQUEST, INVALID_CODE_MESSAGE.to_string()).into_response()
        }
        Err(err) => {
            error!("Password reset failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password reset failed".to_string(),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{auth_state, register_account, sent_code};
    use super::*;
    use axum::body::to_bytes;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn forgot_password_bodies_are_identical() -> anyhow::Result<()> {
        let state = auth_state(false);
        register_account(&state, "alice@example.com", "Passw0rd!", "fp-1").await?;

        let known = forgot_password(
            Extension(state.clone()),
            Some(Json(ForgotPasswordRequest {
                email: "alice@example.com".to_string(),
            })),
        )
        .await
        .into_response();
        let unknown = forgot_password(
            Extension(state),
            Some(Json(ForgotPasswordRequest {
                email: "nobody@example.com".to_string(),
            })),
        )
        .await
        .into_response();

        assert_eq!(known.status(), StatusCode::OK);
        assert_eq!(unknown.status(), StatusCode::OK);
        let known_body = to_bytes(known.into_body(), 4096).await?;
        let unknown_body = to_bytes(unknown.into_body(), 4096).await?;
        assert_eq!(known_body, unknown_body);
        Ok(())
    }

    #[tokio::test]
    async fn reset_round_trip_through_handlers() -> anyhow::Result<()> {
        let state = auth_state(false);
        register_account(&state, "alice@example.com", "Passw0rd!", "fp-1").await?;

        forgot_password(
            Extension(state.clone()),
            Some(Json(ForgotPasswordRequest {
                email: "alice@example.com".to_string(),
            })),
        )
        .await
        .into_response();
        let code = sent_code(&state).expect("reset code delivered");

        let check = verify_reset_code(
            Extension(state.clone()),
            Some(Json(VerifyResetCodeRequest {
                email: "alice@example.com".to_string(),
                code: code.clone(),
            })),
        )
        .await
        .into_response();
        assert_eq!(check.status(), StatusCode::NO_CONTENT);

        let reset = reset_password(
            Extension(state.clone()),
            Some(Json(ResetPasswordRequest {
                email: "alice@example.com".to_string(),
                code: code.clone(),
                new_password: "newpassword".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(reset.status(), StatusCode::NO_CONTENT);

        // The code is spent now.
        let replay = reset_password(
            Extension(state),
            Some(Json(ResetPasswordRequest {
                email: "alice@example.com".to_string(),
                code,
                new_password: "anotherpassword".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reset_rejects_short_password() {
        let response = reset_password(
            Extension(auth_state(false)),
            Some(Json(ResetPasswordRequest {
                email: "alice@example.com".to_string(),
                code: "123456".to_string(),
                new_password: "short".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn verify_reset_code_unknown_email_is_generic() {
        let response = verify_reset_code(
            Extension(auth_state(false)),
            Some(Json(VerifyResetCodeRequest {
                email: "nobody@example.com".to_string(),
                code: "123456".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
