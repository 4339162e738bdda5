use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_ADMIN_TOKEN_SECRET: &str = "admin-token-secret";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_VERIFICATION_REQUIRED: &str = "verification-required";
pub const ARG_VERIFICATION_CODE_TTL_SECONDS: &str = "verification-code-ttl-seconds";

pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    with_verification_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, drives CORS and session cookie attributes")
                .env("CASAGATE_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("Signing secret for user session tokens")
                .env("CASAGATE_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_ADMIN_TOKEN_SECRET)
                .long(ARG_ADMIN_TOKEN_SECRET)
                .help("Signing secret for admin session tokens")
                .env("CASAGATE_ADMIN_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Session token TTL in seconds")
                .env("CASAGATE_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_verification_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERIFICATION_REQUIRED)
                .long(ARG_VERIFICATION_REQUIRED)
                .help("Require email and device verification codes")
                .env("CASAGATE_VERIFICATION_REQUIRED")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_VERIFICATION_CODE_TTL_SECONDS)
                .long(ARG_VERIFICATION_CODE_TTL_SECONDS)
                .help("Verification code TTL in seconds")
                .env("CASAGATE_VERIFICATION_CODE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub token_secret: String,
    pub admin_token_secret: String,
    pub token_ttl_seconds: i64,
    pub verification_required: bool,
    pub verification_code_ttl_seconds: u64,
}

impl Options {
    /// Collect the auth arguments out of parsed matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .context("missing required argument: --frontend-base-url")?;
        let token_secret = matches
            .get_one::<String>(ARG_TOKEN_SECRET)
            .cloned()
            .context("missing required argument: --token-secret")?;
        let admin_token_secret = matches
            .get_one::<String>(ARG_ADMIN_TOKEN_SECRET)
            .cloned()
            .context("missing required argument: --admin-token-secret")?;
        let token_ttl_seconds = matches
            .get_one::<i64>(ARG_TOKEN_TTL_SECONDS)
            .copied()
            .unwrap_or(86400);
        let verification_required = matches
            .get_one::<bool>(ARG_VERIFICATION_REQUIRED)
            .copied()
            .unwrap_or(true);
        let verification_code_ttl_seconds = matches
            .get_one::<u64>(ARG_VERIFICATION_CODE_TTL_SECONDS)
            .copied()
            .unwrap_or(600);

        Ok(Self {
            frontend_base_url,
            token_secret,
            admin_token_secret,
            token_ttl_seconds,
            verification_required,
            verification_code_ttl_seconds,
        })
    }
}
