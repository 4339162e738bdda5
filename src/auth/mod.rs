//! Accounts, device trust, and the orchestration of the auth flows.

pub mod models;
pub mod repo;
pub mod service;

pub use models::{Account, AccountTier, Device, NewAccount};
pub use repo::{AccountStore, DeviceStore, PgAccountStore, PgDeviceStore};
pub use service::{
    AuthError, AuthService, DeviceContext, IssuedSession, LoginOutcome, RegisterOutcome,
    RegisterRequest,
};
