//! In-memory store implementations.
//!
//! Used by tests and by embedders that do not want a database. They honor
//! the same contracts as the Postgres stores, including unique-constraint
//! conflicts on identities.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::attempts::{AttemptStore, LoginAttempt};
use crate::directory::{DirectorySettings, DirectorySettingsStore};
use crate::identity::{Identity, IdentityStore};
use crate::store::StoreError;

/// Identities keyed by id.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    rows: RwLock<HashMap<Uuid, Identity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities.
    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.values().find(|i| i.username == username).cloned())
    }

    async fn find_by_directory_dn(
        &self,
        distinguished_name: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|i| {
                i.directory_dn
                    .as_deref()
                    .is_some_and(|dn| dn.eq_ignore_ascii_case(distinguished_name))
            })
            .max_by_key(|i| i.updated_at)
            .cloned())
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.values().any(|i| i.username == username))
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.values().any(|i| i.email == email))
    }

    async fn save(&self, identity: &Identity) -> Result<Identity, StoreError> {
        let mut rows = self.rows.write().await;
        for other in rows.values().filter(|i| i.id != identity.id) {
            if other.username == identity.username {
                return Err(StoreError::Conflict("identities_username_key".into()));
            }
            if other.email == identity.email {
                return Err(StoreError::Conflict("identities_email_key".into()));
            }
        }
        let saved = match rows.get(&identity.id) {
            // Creation time is fixed once the row exists.
            Some(existing) => Identity {
                created_at: existing.created_at,
                ..identity.clone()
            },
            None => identity.clone(),
        };
        rows.insert(saved.id, saved.clone());
        Ok(saved)
    }
}

/// Append-only attempt log.
#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    rows: Mutex<Vec<LoginAttempt>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored attempts.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    /// Snapshot of all stored attempts, oldest first.
    pub async fn all(&self) -> Vec<LoginAttempt> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn insert(&self, attempt: &LoginAttempt) -> Result<(), StoreError> {
        self.rows.lock().await.push(attempt.clone());
        Ok(())
    }

    async fn count_failed_by_ip_since(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let rows = self.rows.lock().await;
        let count = rows
            .iter()
            .filter(|a| !a.success && a.ip_address == ip_address && a.attempted_at > since)
            .count();
        Ok(count as u64)
    }

    async fn count_failed_by_username_since(
        &self,
        username: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let rows = self.rows.lock().await;
        let count = rows
            .iter()
            .filter(|a| !a.success && a.username == username && a.attempted_at > since)
            .count();
        Ok(count as u64)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|a| a.attempted_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

/// Directory configuration rows.
#[derive(Debug, Default)]
pub struct MemoryDirectorySettingsStore {
    rows: RwLock<Vec<DirectorySettings>>,
}

impl MemoryDirectorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirectorySettingsStore for MemoryDirectorySettingsStore {
    async fn active(&self) -> Result<Option<DirectorySettings>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|s| s.enabled).cloned())
    }

    async fn latest(&self) -> Result<Option<DirectorySettings>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .max_by_key(|s| (s.updated_at, s.id))
            .cloned())
    }

    async fn save(&self, settings: &DirectorySettings) -> Result<DirectorySettings, StoreError> {
        let mut rows = self.rows.write().await;
        let mut saved = settings.clone();
        if saved.id == 0 {
            saved.id = rows.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        }
        if saved.enabled {
            for row in rows.iter_mut().filter(|s| s.id != saved.id) {
                row.enabled = false;
            }
        }
        match rows.iter_mut().find(|s| s.id == saved.id) {
            Some(row) => *row = saved.clone(),
            None => rows.push(saved.clone()),
        }
        Ok(saved)
    }
}
