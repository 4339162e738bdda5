//! Auth configuration and shared handler state.

use std::sync::Arc;

use crate::auth::AuthService;
use crate::token::{TokenService, DEFAULT_TOKEN_TTL_SECONDS};
use crate::verification::DEFAULT_CODE_TTL;

const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:3000";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    token_ttl_seconds: i64,
    verification_required: bool,
    verification_code_ttl_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            verification_required: true,
            verification_code_ttl_seconds: DEFAULT_CODE_TTL.as_secs(),
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_required(mut self, required: bool) -> Self {
        self.verification_required = required;
        self
    }

    #[must_use]
    pub fn with_verification_code_ttl_seconds(mut self, seconds: u64) -> Self {
        self.verification_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn verification_required(&self) -> bool {
        self.verification_required
    }

    #[must_use]
    pub fn verification_code_ttl_seconds(&self) -> u64 {
        self.verification_code_ttl_seconds
    }

    pub(super) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FRONTEND_BASE_URL.to_string())
    }
}

pub struct AuthState {
    config: AuthConfig,
    service: AuthService,
    user_tokens: Arc<TokenService>,
    admin_tokens: Arc<TokenService>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        service: AuthService,
        user_tokens: Arc<TokenService>,
        admin_tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            config,
            service,
            user_tokens,
            admin_tokens,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn service(&self) -> &AuthService {
        &self.service
    }

    #[must_use]
    pub fn user_tokens(&self) -> &TokenService {
        &self.user_tokens
    }

    #[must_use]
    pub fn admin_tokens(&self) -> &TokenService {
        &self.admin_tokens
    }
}
