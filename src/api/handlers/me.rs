//! Authenticated caller introspection.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::auth::Principal;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MeResponse {
    pub subject: String,
    pub email: String,
    pub role: String,
}

/// Return the caller's identity as resolved by the auth middleware.
#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Authenticated caller", body = MeResponse),
        (status = 401, description = "Missing or invalid session token")
    ),
    tag = "me"
)]
pub async fn get_me(principal: Option<Extension<Principal>>) -> impl IntoResponse {
    // The middleware never rejects; absence of a principal is the 401 here.
    let Some(Extension(principal)) = principal else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let response = MeResponse {
        subject: principal.subject,
        email: principal.email,
        role: principal.role.as_str().to_string(),
    };
    (StatusCode::OK, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::super::auth::Role;
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn me_requires_principal() {
        let response = get_me(None).await.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_echoes_the_principal() -> anyhow::Result<()> {
        let principal = Principal {
            subject: "account-1".to_string(),
            email: "alice@example.com".to_string(),
            role: Role::User,
        };
        let response = get_me(Some(Extension(principal))).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), 4096).await?;
        let decoded: MeResponse = serde_json::from_slice(&body)?;
        assert_eq!(decoded.subject, "account-1");
        assert_eq!(decoded.email, "alice@example.com");
        assert_eq!(decoded.role, "user");
        Ok(())
    }
}
