//! Domain models.
//!
//! These are internal domain models, distinct from the HTTP payloads in
//! `warden_api` (which use camelCase renames).

pub mod auth;
pub mod directory;
