//! Request authentication middleware.
//!
//! Every request passes through here. A valid session token attaches a
//! `Principal` to the request extensions; anything else leaves the request
//! unauthenticated and lets the handler decide. The middleware itself never
//! rejects, except that it does not even look at OPTIONS preflights.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::session::extract_session_token;
use super::state::AuthState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

/// Authenticated caller context derived from the session token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub subject: String,
    pub email: String,
    pub role: Role,
}

/// axum middleware: resolve the session token into a `Principal` extension.
pub async fn authenticate(
    State(auth_state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    // CORS preflights carry no credentials worth probing.
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    if let Some(principal) = resolve_principal(request.headers(), &auth_state) {
        request.extensions_mut().insert(principal);
    }

    next.run(request).await
}

/// Probe the user signing domain first, then the admin domain. The token
/// does not say which domain signed it, so validation is the discriminator.
pub(super) fn resolve_principal(headers: &HeaderMap, auth_state: &AuthState) -> Option<Principal> {
    let token = extract_session_token(headers)?;

    let role = if auth_state.user_tokens().validate(&token) {
        Role::User
    } else if auth_state.admin_tokens().validate(&token) {
        Role::Admin
    } else {
        return None;
    };

    // Claims are parse-only here; validate above already proved the
    // signature and expiry.
    let claims = crate::token::TokenService::claims_of(&token).ok()?;
    Some(Principal {
        subject: claims.sub,
        email: claims.email,
        role,
    })
}
