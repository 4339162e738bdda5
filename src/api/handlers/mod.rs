//! API handlers for Casagate.
//!
//! Route handlers live here; the auth submodule also carries the handler
//! state and the request-authentication middleware.

pub mod auth;
pub mod health;
pub mod me;
pub mod root;
