//! # Casagate (Authentication & Device Trust)
//!
//! `casagate` is the authentication authority for the Casagate real-estate
//! platform. It handles registration and login with email verification
//! codes, device-fingerprint step-up authentication, stateless session
//! tokens, and password reset.
//!
//! ## Device Trust
//!
//! Every successful verification binds the verifying device fingerprint to
//! the account. Logins from a known fingerprint proceed directly to a
//! session token; logins from an unknown fingerprint are redirected into a
//! one-time-code step-up flow before the device is trusted.
//!
//! ## Session Tokens
//!
//! Sessions are stateless HMAC-signed tokens. Two independent signing
//! domains exist (user and admin), each with its own secret; tokens from one
//! domain never validate in the other. The request middleware probes the
//! user domain first and falls back to the admin domain.
//!
//! ## Enumeration Protection
//!
//! Registration, resend, and forgot-password endpoints return the same
//! response whether or not the account exists. Login collapses unknown
//! email and wrong password into one generic failure.

pub mod api;
pub mod auth;
pub mod cli;
pub mod token;
pub mod verification;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
