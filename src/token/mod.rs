//! Stateless session tokens (HMAC-SHA256 signed JWTs).
//!
//! Two `TokenService` instances run side by side: one for the user signing
//! domain and one for the admin signing domain. Each derives its signing key
//! from its own secret, so tokens are not interchangeable between domains.
//! Callers that do not know the bearer's role probe both services.
//!
//! The derived key is cached behind a read-mostly lock and rebuilt only when
//! the secret is rotated, keeping the issue/validate hot path lock-light.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::RwLock;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokenHeader {
    pub alg: String,
    pub typ: String,
}

impl SessionTokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTokenClaims {
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("signing key unavailable")]
    KeyUnavailable,
}

/// Signing key derived from the configured secret.
///
/// The generation ties the cached key to the secret that produced it so a
/// rotation invalidates the cache without comparing secret bytes.
#[derive(Clone)]
struct SigningKey {
    generation: u64,
    key: [u8; 32],
}

struct SecretSlot {
    generation: u64,
    secret: SecretString,
}

pub struct TokenService {
    ttl_seconds: i64,
    secret: RwLock<SecretSlot>,
    cached_key: RwLock<Option<SigningKey>>,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: SecretString, ttl_seconds: i64) -> Self {
        Self {
            ttl_seconds,
            secret: RwLock::new(SecretSlot {
                generation: 0,
                secret,
            }),
            cached_key: RwLock::new(None),
        }
    }

    /// Replace the signing secret. Tokens issued under the old secret stop
    /// validating as soon as the cached key is rebuilt.
    pub fn rotate_secret(&self, secret: SecretString) -> Result<(), Error> {
        let mut slot = self.secret.write().map_err(|_| Error::KeyUnavailable)?;
        slot.generation += 1;
        slot.secret = secret;
        Ok(())
    }

    /// Issue a signed token for `subject` with an `email` claim.
    ///
    /// # Errors
    /// Returns an error if the signing key cannot be derived or the claims
    /// cannot be encoded.
    pub fn issue(&self, subject: &str, email: &str) -> Result<String, Error> {
        let now = chrono::Utc::now().timestamp();
        self.issue_at(subject, email, now)
    }

    pub(crate) fn issue_at(&self, subject: &str, email: &str, now: i64) -> Result<String, Error> {
        let claims = SessionTokenClaims {
            sub: subject.to_string(),
            email: email.to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
        };

        let header_b64 = b64e_json(&SessionTokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let key = self.signing_key()?;
        let mut mac = HmacSha256::new_from_slice(&key.key).map_err(|_| Error::KeyUnavailable)?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// True iff the signature verifies against this domain's key and the
    /// token has not expired. Never fails loudly: malformed input is false.
    #[must_use]
    pub fn validate(&self, token: &str) -> bool {
        self.validate_at(token, chrono::Utc::now().timestamp())
    }

    pub(crate) fn validate_at(&self, token: &str, now: i64) -> bool {
        self.verify(token, now).is_ok()
    }

    /// Extract the subject claim without checking expiry or signature.
    ///
    /// Only meaningful after `validate` succeeded; the split lets callers
    /// probe the user domain before falling back to the admin domain without
    /// re-parsing.
    ///
    /// # Errors
    /// Returns an error if the token is malformed.
    pub fn subject_of(&self, token: &str) -> Result<String, Error> {
        Ok(Self::claims_of(token)?.sub)
    }

    /// Parse the claims section of a token without verification.
    ///
    /// # Errors
    /// Returns an error if the token is malformed.
    pub fn claims_of(token: &str) -> Result<SessionTokenClaims, Error> {
        let (_, claims_b64, _) = split(token)?;
        b64d_json(claims_b64)
    }

    fn verify(&self, token: &str, now: i64) -> Result<SessionTokenClaims, Error> {
        let (header_b64, claims_b64, sig_b64) = split(token)?;

        let header: SessionTokenHeader = b64d_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(Error::UnsupportedAlg(header.alg));
        }

        let key = self.signing_key()?;
        let mut mac = HmacSha256::new_from_slice(&key.key).map_err(|_| Error::KeyUnavailable)?;
        mac.update(format!("{header_b64}.{claims_b64}").as_bytes());
        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
        mac.verify_slice(&signature)
            .map_err(|_| Error::InvalidSignature)?;

        let claims: SessionTokenClaims = b64d_json(claims_b64)?;
        if claims.exp <= now {
            return Err(Error::Expired);
        }

        Ok(claims)
    }

    /// Double-checked key cache: read lock on the hot path, write lock only
    /// when the secret generation moved.
    fn signing_key(&self) -> Result<SigningKey, Error> {
        let generation = self
            .secret
            .read()
            .map_err(|_| Error::KeyUnavailable)?
            .generation;

        {
            let cached = self.cached_key.read().map_err(|_| Error::KeyUnavailable)?;
            if let Some(key) = cached.as_ref() {
                if key.generation == generation {
                    return Ok(key.clone());
                }
            }
        }

        let mut cached = self.cached_key.write().map_err(|_| Error::KeyUnavailable)?;
        // Re-check under the write lock; another task may have rebuilt it.
        if let Some(key) = cached.as_ref() {
            if key.generation == generation {
                return Ok(key.clone());
            }
        }

        let slot = self.secret.read().map_err(|_| Error::KeyUnavailable)?;
        let key = derive_key(&slot.secret);
        let fresh = SigningKey {
            generation: slot.generation,
            key,
        };
        *cached = Some(fresh.clone());
        Ok(fresh)
    }
}

fn derive_key(secret: &SecretString) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.expose_secret().as_bytes());
    hasher.finalize().into()
}

fn split(token: &str) -> Result<(&str, &str, &str), Error> {
    let mut parts = token.split('.');
    let header = parts.next().ok_or(Error::TokenFormat)?;
    let claims = parts.next().ok_or(Error::TokenFormat)?;
    let signature = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() {
        return Err(Error::TokenFormat);
    }
    Ok((header, claims, signature))
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}
