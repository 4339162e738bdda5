//! Shared fixtures for the auth handler tests: in-memory stores, a mailbox
//! that captures delivered codes, and registration shortcuts.

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::api::email::{EmailMessage, EmailSender};
use crate::auth::repo::{MemoryAccountStore, MemoryDeviceStore};
use crate::auth::{AuthService, DeviceContext, RegisterOutcome, RegisterRequest};
use crate::token::TokenService;
use crate::verification::CodeStore;

use super::state::{AuthConfig, AuthState};

#[derive(Default)]
struct Mailbox {
    messages: Mutex<Vec<EmailMessage>>,
}

impl EmailSender for Mailbox {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_| anyhow!("poisoned mailbox"))?
            .push(message.clone());
        Ok(())
    }
}

/// Mailboxes keyed by state address so helpers can read back codes from an
/// `Arc<AuthState>` alone.
static MAILBOXES: Lazy<Mutex<HashMap<usize, Arc<Mailbox>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub(super) fn auth_state(verification_required: bool) -> Arc<AuthState> {
    let mailbox = Arc::new(Mailbox::default());
    let user_tokens = Arc::new(TokenService::new(SecretString::from("user-secret"), 3600));
    let admin_tokens = Arc::new(TokenService::new(SecretString::from("admin-secret"), 3600));
    let service = AuthService::new(
        Arc::new(MemoryAccountStore::new()),
        Arc::new(MemoryDeviceStore::new()),
        CodeStore::default(),
        user_tokens.clone(),
        mailbox.clone(),
        verification_required,
    );
    let config = AuthConfig::default().with_verification_required(verification_required);
    let state = Arc::new(AuthState::new(config, service, user_tokens, admin_tokens));

    if let Ok(mut mailboxes) = MAILBOXES.lock() {
        mailboxes.insert(Arc::as_ptr(&state) as usize, mailbox);
    }
    state
}

/// Last code delivered to the state's mailbox, if any.
pub(super) fn sent_code(state: &Arc<AuthState>) -> Option<String> {
    let mailboxes = MAILBOXES.lock().ok()?;
    let mailbox = mailboxes.get(&(Arc::as_ptr(state) as usize))?;
    let messages = mailbox.messages.lock().ok()?;
    let payload: serde_json::Value = serde_json::from_str(&messages.last()?.payload_json).ok()?;
    payload
        .get("code")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

/// Register an account on a verification-disabled state; the fingerprint
/// ends up trusted immediately.
pub(super) async fn register_account(
    state: &Arc<AuthState>,
    email: &str,
    password: &str,
    fingerprint: &str,
) -> Result<()> {
    let outcome = state
        .service()
        .register(
            RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
                first_name: None,
                last_name: None,
            },
            &DeviceContext {
                fingerprint: Some(fingerprint.to_string()),
                user_agent: None,
                ip_address: None,
            },
        )
        .await?;
    match outcome {
        RegisterOutcome::Authenticated(_) => Ok(()),
        RegisterOutcome::VerificationPending { .. } => {
            Err(anyhow!("expected immediate session for test fixture"))
        }
    }
}

/// Register on a verification-required state and hand back the emailed code.
pub(super) async fn pending_registration(
    state: &Arc<AuthState>,
    email: &str,
    password: &str,
) -> Result<String> {
    let outcome = state
        .service()
        .register(
            RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
                first_name: None,
                last_name: None,
            },
            &DeviceContext::default(),
        )
        .await?;
    match outcome {
        RegisterOutcome::VerificationPending { .. } => {
            sent_code(state).context("no verification code delivered")
        }
        RegisterOutcome::Authenticated(_) => {
            Err(anyhow!("expected pending verification for test fixture"))
        }
    }
}
