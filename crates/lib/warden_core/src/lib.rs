//! # warden_core
//!
//! Identity resolution and session issuance: directory and local
//! credential checks, abuse control, identity synchronization, and signed
//! session tokens.

pub mod attempts;
pub mod auth;
pub mod clock;
pub mod crypto;
pub mod directory;
pub mod identity;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod redact;
pub mod store;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
