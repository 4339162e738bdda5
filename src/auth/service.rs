//! Authentication orchestrator.
//!
//! Ties the credential store, device trust registry, verification code
//! store, token service, and email delivery together into the registration,
//! login, device step-up, and password reset flows.
//!
//! Failure semantics: expected failures are typed (`AuthError`) and
//! distinguishable internally; the HTTP boundary collapses them into fixed
//! generic messages. Nothing here retries; every operation is one attempt.

use anyhow::{anyhow, Context};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use ulid::Ulid;

use crate::api::email::{EmailMessage, EmailSender};
use crate::token::TokenService;
use crate::verification::CodeStore;

use super::models::{Account, NewAccount};
use super::repo::{AccountStore, DeviceStore};

const VERIFICATION_CODE_TEMPLATE: &str = "verification_code";
const PASSWORD_RESET_TEMPLATE: &str = "password_reset_code";

/// Prefix separating reset codes from login/registration codes in the
/// code store's purpose-key namespace.
fn reset_key(email: &str) -> String {
    format!("reset:{email}")
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email and wrong password are deliberately the same variant.
    #[error("invalid email or password")]
    InvalidCredentials,
    /// Distinguishable on purpose: the caller already proved they hold a
    /// password for this email, so this is not an enumeration vector worth
    /// hiding behind the generic message.
    #[error("account is deactivated")]
    AccountDeactivated,
    #[error("invalid or expired verification code")]
    InvalidCode,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Per-request device information forwarded from the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct DeviceContext {
    pub fingerprint: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Terminal success state: a signed session token plus the account it
/// belongs to.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub account: Account,
}

#[derive(Debug)]
pub enum RegisterOutcome {
    /// Also returned when the email already has an account, so callers
    /// cannot distinguish the two cases.
    VerificationPending { email: String },
    Authenticated(IssuedSession),
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(IssuedSession),
    VerificationRequired {
        email: String,
        fingerprint: Option<String>,
    },
}

pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    devices: Arc<dyn DeviceStore>,
    codes: CodeStore,
    tokens: Arc<TokenService>,
    mailer: Arc<dyn EmailSender>,
    verification_required: bool,
}

impl AuthService {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        devices: Arc<dyn DeviceStore>,
        codes: CodeStore,
        tokens: Arc<TokenService>,
        mailer: Arc<dyn EmailSender>,
        verification_required: bool,
    ) -> Self {
        Self {
            accounts,
            devices,
            codes,
            tokens,
            mailer,
            verification_required,
        }
    }

    /// Register a new account.
    ///
    /// A duplicate email silently degrades into the verification-pending
    /// path: a fresh code is sent and the response is shaped exactly like a
    /// genuine first registration, so the endpoint never confirms whether an
    /// account exists. No second row is ever created.
    ///
    /// # Errors
    /// Returns `Internal` on storage or delivery failure.
    pub async fn register(
        &self,
        request: RegisterRequest,
        device: &DeviceContext,
    ) -> Result<RegisterOutcome, AuthError> {
        if self.accounts.find_by_email(&request.email).await?.is_some() {
            self.send_verification_code(&request.email).await?;
            return Ok(RegisterOutcome::VerificationPending {
                email: request.email,
            });
        }

        let account = self
            .accounts
            .insert(NewAccount {
                email: request.email.clone(),
                password_hash: hash_password(&request.password)?,
                first_name: request.first_name,
                last_name: request.last_name,
                email_verified: !self.verification_required,
                customer_id: format!("cus_{}", Ulid::new()),
            })
            .await?;

        info!(account_id = %account.id, "account created");

        if self.verification_required {
            self.send_verification_code(&account.email).await?;
            return Ok(RegisterOutcome::VerificationPending {
                email: account.email,
            });
        }

        // Verification disabled: registration and first login collapse.
        self.remember_device(&account, device).await?;
        let session = self.issue_session(account)?;
        Ok(RegisterOutcome::Authenticated(session))
    }

    /// Consume the email verification code, mark the account verified, and
    /// trust the verifying device.
    ///
    /// The device that completes email verification is deliberately the
    /// account's first trusted device.
    ///
    /// # Errors
    /// `InvalidCode` for missing account, wrong, or expired code.
    pub async fn verify_email_and_login(
        &self,
        email: &str,
        code: &str,
        device: &DeviceContext,
    ) -> Result<IssuedSession, AuthError> {
        let Some(account) = self.accounts.find_by_email(email).await? else {
            return Err(AuthError::InvalidCode);
        };
        if !self.codes.verify_and_consume(email, code).await {
            return Err(AuthError::InvalidCode);
        }

        self.accounts.mark_email_verified(account.id).await?;
        self.remember_device(&account, device).await?;

        let account = Account {
            email_verified: true,
            ..account
        };
        self.issue_session(account)
    }

    /// Password login with device-aware step-up.
    ///
    /// # Errors
    /// `InvalidCredentials` for unknown email or wrong password (checked
    /// before any other side effect), `AccountDeactivated` for inactive
    /// accounts, `Internal` for storage/delivery failures.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device: &DeviceContext,
    ) -> Result<LoginOutcome, AuthError> {
        let Some(account) = self.accounts.find_by_email(email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(&account.password_hash, password) {
            return Err(AuthError::InvalidCredentials);
        }
        if !account.active {
            return Err(AuthError::AccountDeactivated);
        }

        let known_device = match device.fingerprint.as_deref() {
            Some(fingerprint) => self.devices.is_known(account.id, fingerprint).await?,
            None => false,
        };

        let account = if account.email_verified {
            account
        } else if self.verification_required {
            // Unverified accounts are redirected into the verification flow
            // rather than rejected.
            self.send_verification_code(&account.email).await?;
            return Ok(LoginOutcome::VerificationRequired {
                email: account.email,
                fingerprint: device.fingerprint.clone(),
            });
        } else {
            self.accounts.mark_email_verified(account.id).await?;
            Account {
                email_verified: true,
                ..account
            }
        };

        if known_device || !self.verification_required {
            if let Some(fingerprint) = device.fingerprint.as_deref() {
                if known_device {
                    self.devices.touch(account.id, fingerprint).await?;
                } else {
                    self.remember_device(&account, device).await?;
                }
            }
            let session = self.issue_session(account)?;
            return Ok(LoginOutcome::Authenticated(session));
        }

        // New device: step-up verification before a token is issued.
        self.send_verification_code(&account.email).await?;
        Ok(LoginOutcome::VerificationRequired {
            email: account.email,
            fingerprint: device.fingerprint.clone(),
        })
    }

    /// Complete device step-up: consume the code and unconditionally trust
    /// the supplied fingerprint.
    ///
    /// No password re-check: this endpoint only completes a login whose
    /// password step already passed.
    ///
    /// # Errors
    /// `InvalidCode` for missing account, wrong, or expired code.
    pub async fn verify_device_and_login(
        &self,
        email: &str,
        code: &str,
        fingerprint: &str,
        device: &DeviceContext,
    ) -> Result<IssuedSession, AuthError> {
        let Some(account) = self.accounts.find_by_email(email).await? else {
            return Err(AuthError::InvalidCode);
        };
        if !self.codes.verify_and_consume(email, code).await {
            return Err(AuthError::InvalidCode);
        }

        self.devices
            .register(
                account.id,
                fingerprint,
                device.user_agent.as_deref(),
                device.ip_address.as_deref(),
            )
            .await?;

        self.issue_session(account)
    }

    /// Re-send a verification code for an unverified account.
    ///
    /// The returned bool is internal only; the boundary always answers with
    /// the same generic message.
    ///
    /// # Errors
    /// Returns `Internal` on storage or delivery failure.
    pub async fn resend_verification(&self, email: &str) -> Result<bool, AuthError> {
        match self.accounts.find_by_email(email).await? {
            Some(account) if !account.email_verified => {
                self.send_verification_code(&account.email).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Start a password reset by sending a code under `reset:<email>`.
    ///
    /// The returned bool (account existed) is internal only; enumeration
    /// protection is enforced at the boundary, which always responds
    /// generically.
    ///
    /// # Errors
    /// Returns `Internal` on storage or delivery failure.
    pub async fn request_password_reset(&self, email: &str) -> Result<bool, AuthError> {
        let Some(account) = self.accounts.find_by_email(email).await? else {
            return Ok(false);
        };
        let code = self.codes.generate(&reset_key(&account.email)).await;
        self.deliver_code(&account.email, PASSWORD_RESET_TEMPLATE, &code)
            .await?;
        Ok(true)
    }

    /// Non-destructive reset-code check, usable any number of times before
    /// the password is actually changed.
    pub async fn verify_reset_code(&self, email: &str, code: &str) -> bool {
        self.codes
            .verify_without_consuming(&reset_key(email), code)
            .await
    }

    /// Change the password after destructively re-verifying the reset code.
    ///
    /// # Errors
    /// `InvalidCode` for missing account, wrong, or expired code.
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let Some(account) = self.accounts.find_by_email(email).await? else {
            return Err(AuthError::InvalidCode);
        };
        if !self.codes.verify_and_consume(&reset_key(email), code).await {
            return Err(AuthError::InvalidCode);
        }

        let password_hash = hash_password(new_password)?;
        self.accounts
            .update_password_hash(account.id, &password_hash)
            .await?;
        info!(account_id = %account.id, "password reset");
        Ok(())
    }

    async fn send_verification_code(&self, email: &str) -> Result<(), AuthError> {
        let code = self.codes.generate(email).await;
        self.deliver_code(email, VERIFICATION_CODE_TEMPLATE, &code)
            .await
    }

    /// Verification sends fail loudly: the caller cannot proceed without
    /// the code, so a delivery failure is an internal error, not a log line.
    async fn deliver_code(&self, email: &str, template: &str, code: &str) -> Result<(), AuthError> {
        let payload = json!({ "email": email, "code": code });
        let payload_text =
            serde_json::to_string(&payload).context("failed to serialize code email payload")?;
        self.mailer
            .send(&EmailMessage {
                to_email: email.to_string(),
                template: template.to_string(),
                payload_json: payload_text,
            })
            .context("failed to deliver verification code")?;
        Ok(())
    }

    async fn remember_device(
        &self,
        account: &Account,
        device: &DeviceContext,
    ) -> Result<(), AuthError> {
        if let Some(fingerprint) = device.fingerprint.as_deref() {
            self.devices
                .register(
                    account.id,
                    fingerprint,
                    device.user_agent.as_deref(),
                    device.ip_address.as_deref(),
                )
                .await?;
        }
        Ok(())
    }

    fn issue_session(&self, account: Account) -> Result<IssuedSession, AuthError> {
        let token = self
            .tokens
            .issue(&account.id.to_string(), &account.email)
            .map_err(|err| anyhow!("failed to issue session token: {err}"))?;
        Ok(IssuedSession { token, account })
    }
}

/// Hash a password into a PHC string with a random salt.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Internal(anyhow!("failed to hash password: {err}")))
}

/// Verify a password against a stored PHC string. Unparseable hashes are a
/// mismatch, never a panic.
#[must_use]
pub fn verify_password(password_hash: &str, password: &str) -> bool {
    PasswordHash::new(password_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}
