//! Password login endpoint with device-aware step-up.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use crate::auth::{AuthError, LoginOutcome};

use super::session::session_response;
use super::state::AuthState;
use super::types::{LoginRequest, VerificationPendingResponse};
use super::utils::{device_context, normalize_email, valid_email};

/// Log in with email and password.
///
/// Unknown email and wrong password produce the identical 401 body. A
/// correct password from an unknown device triggers step-up verification
/// instead of a session.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued or verification required", body = VerificationPendingResponse),
        (status = 400, description = "Malformed payload", body = String),
        (status = 401, description = "Invalid email or password", body = String),
        (status = 403, description = "Account is deactivated", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) || request.password.is_empty() {
        // Shaped like a credential mismatch so malformed probes learn nothing.
        return (
            StatusCode::UNAUTHORIZED,
            "Invalid email or password".to_string(),
        )
            .into_response();
    }

    let device = device_context(&headers, request.fingerprint.as_deref());
    match auth_state
        .service()
        .login(&email, &request.password, &device)
        .await
    {
        Ok(LoginOutcome::Authenticated(session)) => session_response(&auth_state, session),
        Ok(LoginOutcome::VerificationRequired { email, fingerprint }) => (
            StatusCode::OK,
            Json(VerificationPendingResponse {
                message: "Verification code sent".to_string(),
                verification_required: true,
                email,
                fingerprint,
            }),
        )
            .into_response(),
        Err(AuthError::InvalidCredentials) => (
            StatusCode::UNAUTHORIZED,
            "Invalid email or password".to_string(),
        )
            .into_response(),
        Err(AuthError::AccountDeactivated) => (
            StatusCode::FORBIDDEN,
            "Account is deactivated".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!("Login failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{auth_state, register_account};
    use super::*;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn login_missing_payload() {
        let response = login(HeaderMap::new(), Extension(auth_state(true)), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_unknown_email_is_unauthorized() {
        let response = login(
            HeaderMap::new(),
            Extension(auth_state(true)),
            Some(Json(LoginRequest {
                email: "nobody@example.com".to_string(),
                password: "Passw0rd!".to_string(),
                fingerprint: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_malformed_email_matches_credential_failure() {
        let response = login(
            HeaderMap::new(),
            Extension(auth_state(true)),
            Some(Json(LoginRequest {
                email: "not-an-email".to_string(),
                password: "Passw0rd!".to_string(),
                fingerprint: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_known_device_issues_session() -> anyhow::Result<()> {
        let state = auth_state(false);
        register_account(&state, "alice@example.com", "Passw0rd!", "fp-1").await?;

        let response = login(
            HeaderMap::new(),
            Extension(state),
            Some(Json(LoginRequest {
                email: "alice@example.com".to_string(),
                password: "Passw0rd!".to_string(),
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
    async fn login_wrong_password_is_unauthorized() -> anyhow::Result<()> {
        let state = auth_state(false);
        register_account(&state, "alice@example.com", "Passw0rd!", "fp-1").await?;

        let response = login(
            HeaderMap::new(),
            Extension(state),
            Some(Json(LoginRequest {
                email: "alice@example.com".to_string(),
                password: "wrong-password".to_string(),
                fingerprint: Some("fp-1".to_string()),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
