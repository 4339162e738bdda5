//! Auth handlers and supporting modules.
//!
//! Registration, login, device step-up, and password reset share a common
//! posture: expected failures collapse into fixed generic messages so none
//! of the endpoints can be used to enumerate accounts. The middleware in
//! `principal` attaches the authenticated caller for everything downstream.

pub(crate) mod login;
pub(crate) mod password_reset;
pub(crate) mod principal;
pub(crate) mod register;
mod session;
mod state;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use principal::{Principal, Role};
pub use state::{AuthConfig, AuthState};

#[cfg(test)]
mod tests;
