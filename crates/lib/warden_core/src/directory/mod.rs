//! External directory (LDAP) authentication.
//!
//! The directory path is a soft dependency: every transport, protocol, or
//! configuration problem surfaces as [`DirectoryOutcome::TransportError`]
//! so the resolver can decide whether to fall back.

pub mod admin;
pub mod client;
pub mod queries;
pub mod sanitize;
pub mod settings;

use async_trait::async_trait;
use thiserror::Error;

pub use crate::models::directory::{DirectorySettings, DirectoryUser};
use crate::store::StoreError;

/// Directory errors. None of them is a security exception.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid search filter: {0}")]
    InvalidFilter(String),

    #[error("Directory not configured: {0}")]
    NotConfigured(String),

    #[error("Directory request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Directory connection failed: {0}")]
    Connection(String),

    #[error("Directory protocol error: {0}")]
    Protocol(String),

    #[error("Directory bind credential unavailable")]
    CredentialUnavailable,

    #[error("Directory entry not found: {0}")]
    MissingEntry(String),
}

/// Result of one directory authentication attempt.
#[derive(Debug)]
pub enum DirectoryOutcome {
    /// The directory accepted the credentials.
    Success { distinguished_name: String },
    /// The user was not found or the password was rejected.
    BadCredentials,
    /// The directory could not be consulted.
    TransportError(DirectoryError),
}

/// Directory client port.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Search for the user, then bind as the found entry with `password`.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        settings: &DirectorySettings,
    ) -> DirectoryOutcome;

    /// DN of the first entry matching `username`, if any.
    ///
    /// When several entries match, the first one returned by the server
    /// wins; duplicates in the directory are not detected.
    async fn find_distinguished_name(
        &self,
        username: &str,
        settings: &DirectorySettings,
    ) -> Result<Option<String>, DirectoryError>;

    /// Entries matching `username` through the configured filter, read with
    /// their `uid`, `mail` and `cn` attributes.
    async fn search_users(
        &self,
        username: &str,
        settings: &DirectorySettings,
    ) -> Result<Vec<DirectoryUser>, DirectoryError>;

    /// Bind as the configured service account and read the root entry.
    ///
    /// A missing root is [`DirectoryError::MissingEntry`]; a missing
    /// user-search base is only reported in the returned check.
    async fn test_connection(
        &self,
        settings: &DirectorySettings,
    ) -> Result<ConnectionCheck, DirectoryError>;
}

/// Result of a successful [`Directory::test_connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionCheck {
    /// Whether the user-search base exists. Always true when it is the root.
    pub user_search_base_found: bool,
}

/// Storage of the (single) active directory configuration.
#[async_trait]
pub trait DirectorySettingsStore: Send + Sync {
    /// The enabled configuration, if any.
    async fn active(&self) -> Result<Option<DirectorySettings>, StoreError>;

    /// The most recently updated configuration, enabled or not.
    async fn latest(&self) -> Result<Option<DirectorySettings>, StoreError>;

    /// Insert (`id == 0`) or update the configuration. Enabling it disables
    /// every other row.
    async fn save(&self, settings: &DirectorySettings) -> Result<DirectorySettings, StoreError>;
}
