//! Email delivery abstraction.
//!
//! Verification and password reset codes are delivered inline from the
//! request path: the caller cannot make progress without the code, so a
//! delivery failure surfaces as an error on the request instead of being
//! queued and retried. The `EmailSender` trait is the seam: swap in an
//! SMTP or API-backed implementation without touching the auth flows.
//!
//! The default sender for local dev is `LogEmailSender`, which logs and
//! returns `Ok(())`.
use anyhow::Result;
use tracing::info;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Email delivery abstraction used by the auth flows.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to fail the request.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}
