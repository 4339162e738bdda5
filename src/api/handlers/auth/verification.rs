//! Email and device verification endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use crate::auth::AuthError;

use super::session::session_response;
use super::state::AuthState;
use super::types::{
    MessageResponse, ResendVerificationRequest, VerifyDeviceRequest, VerifyEmailRequest,
};
use super::utils::{device_context, normalize_email, valid_code, valid_email};

const INVALID_CODE_MESSAGE: &str = "Invalid or expired verification code";

/// Verify the email code, activate the account, and start a session.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified, session issued"),
        (status = 400, description = "Invalid or expired verification code", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let request: VerifyEmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    let code = request.code.trim();
    if !valid_email(&email) || !valid_code(code) {
        // Same body as a wrong code; malformed input reveals nothing.
        return (StatusCode::BAD_REQUEST, INVALID_CODE_MESSAGE.to_string()).into_response();
    }

    let device = device_context(&headers, request.fingerprint.as_deref());
    match auth_state
        .service()
        .verify_email_and_login(&email, code, &device)
        .await
    {
        Ok(session) => session_response(&auth_state, session),
        Err(AuthError::InvalidCode) => {
            (StatusCode::BAD_REQUEST, INVALID_CODE_MESSAGE.to_string()).into_response()
        }
        Err(err) => {
            error!("Email verification failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response()
        }
    }
}

/// Complete step-up for a new device and start a session.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-device",
    request_body = VerifyDeviceRequest,
    responses(
        (status = 200, description = "Device trusted, session issued"),
        (status = 400, description = "Invalid or expired verification code", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_device(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyDeviceRequest>>,
) -> impl IntoResponse {
    let request: VerifyDeviceRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let fingerprint = request.fingerprint.trim();
    if fingerprint.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing fingerprint".to_string()).into_response();
    }
    let email = normalize_email(&request.email);
    let code = request.code.trim();
    if !valid_email(&email) || !valid_code(code) {
        return (StatusCode::BAD_REQUEST, INVALID_CODE_MESSAGE.to_string()).into_response();
    }

    let device = device_context(&headers, Some(fingerprint));
    match auth_state
        .service()
        .verify_device_and_login(&email, code, fingerprint, &device)
        .await
    {
        Ok(session) => session_response(&auth_state, session),
        Err(AuthError::InvalidCode) => {
            (StatusCode::BAD_REQUEST, INVALID_CODE_MESSAGE.to_string()).into_response()
        }
        Err(err) => {
            error!("Device verification failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response()
        }
    }
}

/// Re-send a verification code (always a generic 200 to avoid enumeration).
#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Resend accepted", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> impl IntoResponse {
    let generic = || {
        (
            StatusCode::OK,
            Json(MessageResponse {
                message: "If verification is pending, a new code was sent".to_string(),
            }),
        )
            .into_response()
    };

    let request: ResendVerificationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        // Invalid emails still get the generic body.
        return generic();
    }

    if let Err(err) = auth_state.service().resend_verification(&email).await {
        // Keep the response opaque; the failure is ours, not the caller's.
        error!("Failed to resend verification code: {err}");
    }
    generic()
}

#[cfg(test)]
mod tests {
    use super::super::tests::{auth_state, pending_registration};
    use super::*;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn verify_email_missing_payload() {
        let response = verify_email(HeaderMap::new(), Extension(auth_state(true)), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn verify_email_rejects_malformed_code() {
        let response = verify_email(
            HeaderMap::new(),
            Extension(auth_state(true)),
            Some(Json(VerifyEmailRequest {
                email: "alice@example.com".to_string(),
                code: "12345".to_string(),
                fingerprint: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn verify_email_with_sent_code_issues_session() -> anyhow::Result<()> {
        let state = auth_state(true);
        let code = pending_registration(&state, "alice@example.com", "Passw0rd!").await?;

        let response = verify_email(
            HeaderMap::new(),
            Extension(state),
            Some(Json(VerifyEmailRequest {
                email: "alice@example.com".to_string(),
                code,
                fingerprint: Some("fp-1".to_string()),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(axum::http::header::SET_COOKIE));
        Ok(())
    }

    #[tokio::test]
    async fn verify_device_requires_fingerprint() {
        let response = verify_device(
            HeaderMap::new(),
            Extension(auth_state(true)),
            Some(Json(VerifyDeviceRequest {
                email: "alice@example.com".to_string(),
                code: "123456".to_string(),
                fingerprint: "  ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn verify_device_wrong_code_is_generic() -> anyhow::Result<()> {
        let state = auth_state(true);
        pending_registration(&state, "alice@example.com", "Passw0rd!").await?;

        let response = verify_device(
            HeaderMap::new(),
            Extension(state),
            Some(Json(VerifyDeviceRequest {
                email: "alice@example.com".to_string(),
                code: "000000".to_string(),
                fingerprint: "fp-1".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn resend_is_generic_for_unknown_email() {
        let response = resend_verification(
            Extension(auth_state(true)),
            Some(Json(ResendVerificationRequest {
                email: "nobody@example.com".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn resend_is_generic_for_invalid_email() {
        let response = resend_verification(
            Extension(auth_state(true)),
            Some(Json(ResendVerificationRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
