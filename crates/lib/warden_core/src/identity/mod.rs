//! Local identity records and their reconciliation with the directory.

pub mod local;
pub mod queries;
pub mod sync;

use async_trait::async_trait;

pub use crate::models::auth::{Identity, IdentitySummary};
use crate::store::StoreError;
pub use local::{AccountError, LocalAccounts, NewLocalAccount};
pub use sync::{DirectoryImport, IdentitySynchronizer, ImportError, SyncPolicy};

/// Keyed access to identities.
///
/// `save` inserts when no row has the identity's id and updates otherwise.
/// A username or email already used by another row is
/// [`StoreError::Conflict`].
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError>;

    /// Identity linked to the directory entry `distinguished_name`.
    /// DNs compare without case.
    async fn find_by_directory_dn(
        &self,
        distinguished_name: &str,
    ) -> Result<Option<Identity>, StoreError>;

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError>;

    async fn save(&self, identity: &Identity) -> Result<Identity, StoreError>;
}
