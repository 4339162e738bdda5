use crate::api::{self, handlers::auth::AuthConfig, TokenSecrets};
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub token_secret: SecretString,
    pub admin_token_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub verification_required: bool,
    pub verification_code_ttl_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_token_ttl_seconds(args.token_ttl_seconds)
        .with_verification_required(args.verification_required)
        .with_verification_code_ttl_seconds(args.verification_code_ttl_seconds);

    let secrets = TokenSecrets {
        user: args.token_secret,
        admin: args.admin_token_secret,
    };

    api::new(args.port, args.dsn, auth_config, secrets).await
}
