//! # vouch_core
//!
//! Authentication and session-lifecycle core for Vouch: credential hashing,
//! signing-key management, bearer-token issuance and refresh-token rotation.

pub mod auth;
pub mod config;
pub mod migrate;
pub mod models;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
