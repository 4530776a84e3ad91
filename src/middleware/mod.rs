//! Middleware for the lending API
//!
//! Request tracing and caller identification.

mod auth;
mod tracing;

pub use auth::CallerIdentity;
pub use tracing::request_tracing;
