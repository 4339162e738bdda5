//! Short-lived email verification codes.
//!
//! Codes are 6 decimal digits, keyed by an opaque purpose string: the raw
//! email for registration/login/device verification, `reset:<email>` for
//! password reset. At most one live code exists per key; generating again
//! supersedes the previous code.
//!
//! The store is in-memory. Expired entries are pruned opportunistically on
//! insert and purged on lookup; there is no background sweep. Check and
//! remove happen under a single lock acquisition, so a correct code can be
//! consumed exactly once even under concurrent verification attempts.

use rand::{rngs::OsRng, Rng};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(10 * 60);

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

struct StoredCode {
    code: String,
    expires_at: Instant,
}

pub struct CodeStore {
    ttl: Duration,
    codes: Mutex<HashMap<String, StoredCode>>,
}

impl CodeStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            codes: Mutex::new(HashMap::new()),
        }
    }

    /// Draw a fresh code for `purpose_key`, superseding any previous one.
    /// The code is returned for delivery; it is never logged here.
    pub async fn generate(&self, purpose_key: &str) -> String {
        let code = format!("{}", OsRng.gen_range(CODE_MIN..=CODE_MAX));
        let mut codes = self.codes.lock().await;
        codes.retain(|_, entry| entry.expires_at > Instant::now());
        codes.insert(
            purpose_key.to_string(),
            StoredCode {
                code: code.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        code
    }

    /// True iff a live entry exists for the key and matches; the matching
    /// entry is removed in the same lock acquisition (single use). Expired
    /// entries are purged on sight but a live mismatch is left untouched.
    pub async fn verify_and_consume(&self, purpose_key: &str, supplied: &str) -> bool {
        let mut codes = self.codes.lock().await;
        match codes.get(purpose_key) {
            Some(entry) if entry.expires_at <= Instant::now() => {
                codes.remove(purpose_key);
                false
            }
            Some(entry) if entry.code == supplied => {
                codes.remove(purpose_key);
                true
            }
            _ => false,
        }
    }

    /// Same matching rules as `verify_and_consume` but never removes a live
    /// entry, letting a reset code be checked before the password change
    /// actually spends it.
    pub async fn verify_without_consuming(&self, purpose_key: &str, supplied: &str) -> bool {
        let mut codes = self.codes.lock().await;
        match codes.get(purpose_key) {
            Some(entry) if entry.expires_at <= Instant::now() => {
                codes.remove(purpose_key);
                false
            }
            Some(entry) => entry.code == supplied,
            None => false,
        }
    }
}

impl Default for CodeStore {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generated_codes_are_six_digits() {
        let store = CodeStore::default();
        for _ in 0..32 {
            let code = store.generate("alice@example.com").await;
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            let value: u32 = code.parse().expect("numeric code");
            assert!((CODE_MIN..=CODE_MAX).contains(&value));
        }
    }

    #[tokio::test]
    async fn wrong_code_does_not_consume() {
        let store = CodeStore::default();
        let code = store.generate("alice@example.com").await;

        assert!(!store.verify_and_consume("alice@example.com", "000000").await);
        // The original code is still good for one correct attempt.
        assert!(store.verify_and_consume("alice@example.com", &code).await);
    }

    #[tokio::test]
    async fn correct_code_consumes_exactly_once() {
        let store = CodeStore::default();
        let code = store.generate("alice@example.com").await;

        assert!(store.verify_and_consume("alice@example.com", &code).await);
        assert!(!store.verify_and_consume("alice@example.com", &code).await);
    }

    #[tokio::test]
    async fn verify_without_consuming_is_repeatable() {
        let store = CodeStore::default();
        let code = store.generate("reset:alice@example.com").await;

        for _ in 0..5 {
            assert!(
                store
                    .verify_without_consuming("reset:alice@example.com", &code)
                    .await
            );
        }
        // The final consuming check still succeeds.
        assert!(
            store
                .verify_and_consume("reset:alice@example.com", &code)
                .await
        );
        assert!(
            !store
                .verify_without_consuming("reset:alice@example.com", &code)
                .await
        );
    }

    #[tokio::test]
    async fn regenerating_supersedes_previous_code() {
        let store = CodeStore::default();
        let old = store.generate("alice@example.com").await;
        let new = store.generate("alice@example.com").await;

        if old != new {
            assert!(!store.verify_and_consume("alice@example.com", &old).await);
        }
        assert!(store.verify_and_consume("alice@example.com", &new).await);
    }

    #[tokio::test]
    async fn expired_codes_never_match() {
        let store = CodeStore::new(Duration::ZERO);
        let code = store.generate("alice@example.com").await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(!store.verify_without_consuming("alice@example.com", &code).await);
        assert!(!store.verify_and_consume("alice@example.com", &code).await);
    }

    #[tokio::test]
    async fn purpose_keys_are_independent_namespaces() {
        let store = CodeStore::default();
        let login = store.generate("alice@example.com").await;
        let reset = store.generate("reset:alice@example.com").await;

        assert!(store.verify_and_consume("alice@example.com", &login).await);
        // Consuming the login code leaves the reset code alone.
        assert!(
            store
                .verify_and_consume("reset:alice@example.com", &reset)
                .await
        );
    }

    #[tokio::test]
    async fn missing_key_is_false() {
        let store = CodeStore::default();
        assert!(!store.verify_and_consume("nobody@example.com", "123456").await);
        assert!(
            !store
                .verify_without_consuming("nobody@example.com", "123456")
                .await
        );
    }
}
