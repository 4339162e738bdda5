//! Validation and device fingerprint helpers for the auth handlers.

use axum::http::header::{ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT};
use axum::http::HeaderMap;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::auth::DeviceContext;

pub(super) const MIN_PASSWORD_LENGTH: usize = 8;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Registration password policy: length plus upper, lower, digit, and a
/// special character.
pub(super) fn strong_password(password: &str) -> bool {
    password.len() >= MIN_PASSWORD_LENGTH
        && password.chars().any(char::is_uppercase)
        && password.chars().any(char::is_lowercase)
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric())
}

/// Reset password policy is length-only; looser than registration on purpose
/// to match the existing account base.
pub(super) fn acceptable_reset_password(password: &str) -> bool {
    password.len() >= MIN_PASSWORD_LENGTH
}

/// Verification codes are exactly 6 ASCII digits.
pub(super) fn valid_code(code: &str) -> bool {
    code.len() == 6 && code.chars().all(|c| c.is_ascii_digit())
}

/// Derive a stable fingerprint from request headers for clients that do not
/// supply one. Missing headers contribute empty strings so the value stays
/// deterministic for a given client setup.
pub(super) fn derived_fingerprint(headers: &HeaderMap) -> String {
    let header = |name| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    };
    let input = format!(
        "{}|{}|{}",
        header(USER_AGENT),
        header(ACCEPT_LANGUAGE),
        header(ACCEPT_ENCODING)
    );

    let digest = Sha256::digest(input.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix).to_string()
}

/// Extract a client IP from common proxy headers.
pub(super) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Assemble the device context for a request: client-supplied fingerprint
/// when present, header-derived fallback otherwise.
pub(super) fn device_context(headers: &HeaderMap, fingerprint: Option<&str>) -> DeviceContext {
    let fingerprint = fingerprint
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| derived_fingerprint(headers));

    DeviceContext {
        fingerprint: Some(fingerprint),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        ip_address: extract_client_ip(headers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn strong_password_requires_all_classes() {
        assert!(strong_password("Passw0rd!"));
        assert!(!strong_password("Pass0rd!")); // too short
        assert!(!strong_password("passw0rd!")); // no upper
        assert!(!strong_password("PASSW0RD!")); // no lower
        assert!(!strong_password("Password!")); // no digit
        assert!(!strong_password("Passw0rd1")); // no special
    }

    #[test]
    fn reset_password_policy_is_length_only() {
        assert!(acceptable_reset_password("lowercase"));
        assert!(!acceptable_reset_password("short1!"));
    }

    #[test]
    fn valid_code_is_exactly_six_digits() {
        assert!(valid_code("123456"));
        assert!(!valid_code("12345"));
        assert!(!valid_code("1234567"));
        assert!(!valid_code("12345a"));
        assert!(!valid_code(""));
    }

    #[test]
    fn derived_fingerprint_is_deterministic() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("test-agent"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));

        let first = derived_fingerprint(&headers);
        let second = derived_fingerprint(&headers);
        assert_eq!(first, second);
        assert!(first.chars().all(|c| c.is_ascii_digit()));

        headers.insert(USER_AGENT, HeaderValue::from_static("other-agent"));
        assert_ne!(derived_fingerprint(&headers), first);
    }

    #[test]
    fn derived_fingerprint_handles_missing_headers() {
        let empty = derived_fingerprint(&HeaderMap::new());
        assert!(!empty.is_empty());
    }

    #[test]
    fn device_context_prefers_supplied_fingerprint() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("test-agent"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));

        let context = device_context(&headers, Some(" fp-client "));
        assert_eq!(context.fingerprint.as_deref(), Some("fp-client"));
        assert_eq!(context.user_agent.as_deref(), Some("test-agent"));
        assert_eq!(context.ip_address.as_deref(), Some("10.0.0.9"));

        let fallback = device_context(&headers, Some("  "));
        assert_eq!(
            fallback.fingerprint.as_deref(),
            Some(derived_fingerprint(&headers).as_str())
        );
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn extract_client_ip_none_when_missing() {
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }
}
