//! Login attempt ledger: rate limiting, account lockout, and retention.

pub mod ledger;
pub mod queries;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use crate::models::auth::LoginAttempt;
use crate::store::StoreError;
pub use ledger::{AttemptLedger, LedgerPolicy, spawn_sweeper};

/// Append-only attempt storage.
///
/// Counts include only attempts with a timestamp strictly after `since`.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn insert(&self, attempt: &LoginAttempt) -> Result<(), StoreError>;

    async fn count_failed_by_ip_since(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn count_failed_by_username_since(
        &self,
        username: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Delete attempts strictly older than `cutoff`; returns rows removed.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
