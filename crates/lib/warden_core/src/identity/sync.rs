//! Reconcile local identities with directory logins and imports.

use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Identity, IdentityStore};
use crate::clock::Clock;
use crate::store::StoreError;

/// Directory entry an administrator imports ahead of its first login.
#[derive(Debug, Clone)]
pub struct DirectoryImport {
    /// Sanitized username.
    pub username: String,
    pub distinguished_name: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Replaces the stored roles when non-empty. A new identity without
    /// roles gets the policy's default role.
    pub roles: Vec<String>,
}

/// Import refusals.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("User already exists: {0}")]
    UsernameActive(String),

    #[error("User with this directory DN already exists: {0}")]
    DistinguishedNameActive(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Short hex tag derived from `source`, used to tell placeholder emails apart.
fn email_tag(source: &str) -> String {
    Sha256::digest(source.as_bytes())
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Defaults applied to identities first seen through the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPolicy {
    pub default_role: String,
    pub placeholder_email_domain: String,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            default_role: "developer".to_string(),
            placeholder_email_domain: "example.com".to_string(),
        }
    }
}

/// Creates or updates the local record after a successful directory bind.
///
/// Calls for the same username are serialized within the process. Across
/// processes the store's unique constraint decides, and the loser retries
/// once as an update.
pub struct IdentitySynchronizer {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    policy: SyncPolicy,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IdentitySynchronizer {
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>, policy: SyncPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            locks: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Run `work` while holding the per-username lock.
    async fn serialized<T>(&self, username: &str, work: impl Future<Output = T>) -> T {
        let lock = self.locks.entry(username.to_string()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            work.await
        };
        drop(lock);
        self.locks.remove_if(username, |_, l| Arc::strong_count(l) == 1);
        result
    }

    /// Attach the directory reference to `username`, creating the identity
    /// if needed. Clears any local password and reactivates the record.
    pub async fn sync_from_directory(
        &self,
        username: &str,
        distinguished_name: Option<&str>,
    ) -> Result<Identity, StoreError> {
        self.serialized(username, async {
            match self.apply(username, distinguished_name).await {
                Err(StoreError::Conflict(constraint)) => {
                    warn!(username, %constraint, "concurrent identity creation, retrying as update");
                    self.apply(username, distinguished_name).await
                }
                other => other,
            }
        })
        .await
    }

    /// Create or reactivate the identity for a directory entry.
    ///
    /// An inactive identity is matched by username first, then by DN; a DN
    /// match takes the entry's username. Active matches are refused.
    pub async fn import_from_directory(
        &self,
        entry: &DirectoryImport,
    ) -> Result<Identity, ImportError> {
        self.serialized(&entry.username, self.import(entry)).await
    }

    /// `preferred` when free, else `username@domain`, else that address
    /// tagged with a digest of the DN (or username).
    async fn available_email(
        &self,
        preferred: Option<&str>,
        username: &str,
        distinguished_name: Option<&str>,
    ) -> Result<String, StoreError> {
        let domain = &self.policy.placeholder_email_domain;
        let placeholder = format!("{username}@{domain}");
        for candidate in preferred.into_iter().chain([placeholder.as_str()]) {
            if !self.store.exists_by_email(candidate).await? {
                return Ok(candidate.to_string());
            }
        }
        let tagged = format!(
            "{username}+{}@{domain}",
            email_tag(distinguished_name.unwrap_or(username))
        );
        warn!(username, email = %tagged, "placeholder email taken, using tagged address");
        Ok(tagged)
    }

    async fn import(&self, entry: &DirectoryImport) -> Result<Identity, ImportError> {
        let username = entry.username.as_str();
        let dn = entry.distinguished_name.as_str();
        let existing = match self.store.find_by_username(username).await? {
            Some(found) if found.active => {
                return Err(ImportError::UsernameActive(username.to_string()));
            }
            Some(found) => Some(found),
            None => match self.store.find_by_directory_dn(dn).await? {
                Some(found) if found.active => {
                    return Err(ImportError::DistinguishedNameActive(dn.to_string()));
                }
                found => found,
            },
        };

        let now = self.clock.now();
        let identity = match existing {
            Some(mut inactive) => {
                info!(username, previous = %inactive.username, "reactivating identity from directory import");
                if let Some(email) = entry.email.as_deref()
                    && email != inactive.email
                    && !self.store.exists_by_email(email).await?
                {
                    inactive.email = email.to_string();
                }
                if let Some(name) = &entry.display_name {
                    inactive.display_name = name.clone();
                }
                if !entry.roles.is_empty() {
                    inactive.roles = entry.roles.clone();
                }
                inactive.username = username.to_string();
                inactive.directory_dn = Some(dn.to_string());
                inactive.password_hash = None;
                inactive.active = true;
                inactive.updated_at = now;
                inactive
            }
            None => {
                let email = self
                    .available_email(entry.email.as_deref(), username, Some(dn))
                    .await?;
                let display_name = entry
                    .display_name
                    .clone()
                    .unwrap_or_else(|| username.to_string());
                let mut created = Identity::new(username, email, display_name, now);
                created.directory_dn = Some(dn.to_string());
                created.roles = if entry.roles.is_empty() {
                    vec![self.policy.default_role.clone()]
                } else {
                    entry.roles.clone()
                };
                info!(username, roles = ?created.roles, "importing identity from directory");
                created
            }
        };
        Ok(self.store.save(&identity).await?)
    }

    async fn apply(
        &self,
        username: &str,
        distinguished_name: Option<&str>,
    ) -> Result<Identity, StoreError> {
        let now = self.clock.now();
        let identity = match self.store.find_by_username(username).await? {
            Some(mut existing) => {
                if let Some(dn) = distinguished_name {
                    existing.directory_dn = Some(dn.to_string());
                }
                if existing.password_hash.take().is_some() {
                    debug!(username, "cleared local credential of directory identity");
                }
                if !existing.active {
                    info!(username, "reactivating identity after directory login");
                    existing.active = true;
                }
                existing.updated_at = now;
                existing
            }
            None => {
                let email = self
                    .available_email(None, username, distinguished_name)
                    .await?;
                let mut created = Identity::new(username, email, username, now);
                created.directory_dn = distinguished_name.map(str::to_string);
                created.roles = vec![self.policy.default_role.clone()];
                info!(username, role = %self.policy.default_role, "creating identity from directory");
                created
            }
        };
        self.store.save(&identity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use crate::memory::MemoryIdentityStore;
    use chrono::{Duration, Utc};

    const DN: &str = "uid=ada,ou=people,dc=example,dc=com";

    fn synchronizer(store: Arc<MemoryIdentityStore>) -> IdentitySynchronizer {
        IdentitySynchronizer::new(store, Arc::new(SystemClock), SyncPolicy::default())
    }

    #[tokio::test]
    async fn first_login_creates_identity() {
        let store = Arc::new(MemoryIdentityStore::new());
        let identity = synchronizer(store.clone())
            .sync_from_directory("ada", Some(DN))
            .await
            .unwrap();

        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.display_name, "ada");
        assert_eq!(identity.directory_dn.as_deref(), Some(DN));
        assert_eq!(identity.roles, vec!["developer".to_string()]);
        assert!(identity.active);
        assert!(identity.password_hash.is_none());
    }

    #[tokio::test]
    async fn second_sync_updates_same_row() {
        let store = Arc::new(MemoryIdentityStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let sync = IdentitySynchronizer::new(store.clone(), clock.clone(), SyncPolicy::default());

        let first = sync.sync_from_directory("ada", Some(DN)).await.unwrap();
        clock.advance(Duration::minutes(5));
        let second = sync.sync_from_directory("ada", Some(DN)).await.unwrap();

        assert_eq!(store.count().await, 1);
        assert_eq!(first.id, second.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[tokio::test]
    async fn existing_local_identity_is_converted() {
        let store = Arc::new(MemoryIdentityStore::new());
        let mut local = Identity::new("ada", "ada@corp.test", "Ada Lovelace", Utc::now());
        local.password_hash = Some("$2b$10$abcdefghijklmnopqrstuv".into());
        local.active = false;
        local.roles = vec!["admin".into()];
        store.save(&local).await.unwrap();

        let synced = synchronizer(store.clone())
            .sync_from_directory("ada", Some(DN))
            .await
            .unwrap();

        assert_eq!(synced.id, local.id);
        assert!(synced.active);
        assert!(synced.password_hash.is_none());
        assert_eq!(synced.directory_dn.as_deref(), Some(DN));
        assert_eq!(synced.email, "ada@corp.test");
        assert_eq!(synced.roles, vec!["admin".to_string()]);
    }

    #[tokio::test]
    async fn missing_dn_keeps_existing_reference() {
        let store = Arc::new(MemoryIdentityStore::new());
        let sync = synchronizer(store.clone());
        sync.sync_from_directory("ada", Some(DN)).await.unwrap();
        let again = sync.sync_from_directory("ada", None).await.unwrap();
        assert_eq!(again.directory_dn.as_deref(), Some(DN));
    }

    #[tokio::test]
    async fn policy_controls_defaults() {
        let store = Arc::new(MemoryIdentityStore::new());
        let sync = IdentitySynchronizer::new(
            store,
            Arc::new(SystemClock),
            SyncPolicy {
                default_role: "viewer".into(),
                placeholder_email_domain: "corp.test".into(),
            },
        );
        let identity = sync.sync_from_directory("bob", None).await.unwrap();
        assert_eq!(identity.email, "bob@corp.test");
        assert_eq!(identity.roles, vec!["viewer".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_logins_create_one_row() {
        let store = Arc::new(MemoryIdentityStore::new());
        let sync = Arc::new(synchronizer(store.clone()));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let sync = sync.clone();
                tokio::spawn(async move { sync.sync_from_directory("ada", Some(DN)).await })
            })
            .collect();
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }

        assert_eq!(store.count().await, 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert!(sync.locks.is_empty());
    }

    #[tokio::test]
    async fn taken_placeholder_email_gets_a_tag() {
        let store = Arc::new(MemoryIdentityStore::new());
        let squatter = Identity::new("ada2", "ada@example.com", "Someone", Utc::now());
        store.save(&squatter).await.unwrap();

        let sync = synchronizer(store.clone());
        let created = sync.sync_from_directory("ada", Some(DN)).await.unwrap();
        assert_eq!(created.email, format!("ada+{}@example.com", email_tag(DN)));
        assert_eq!(created.email.len(), "ada+@example.com".len() + 8);
        assert_eq!(store.count().await, 2);

        let again = sync.sync_from_directory("ada", Some(DN)).await.unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(again.email, created.email);
    }

    fn import(username: &str, dn: &str) -> DirectoryImport {
        DirectoryImport {
            username: username.into(),
            distinguished_name: dn.into(),
            email: Some(format!("{username}@corp.test")),
            display_name: Some("Ada Lovelace".into()),
            roles: Vec::new(),
        }
    }

    #[tokio::test]
    async fn import_creates_from_directory_attributes() {
        let store = Arc::new(MemoryIdentityStore::new());
        let sync = synchronizer(store.clone());
        let created = sync.import_from_directory(&import("ada", DN)).await.unwrap();
        assert_eq!(created.email, "ada@corp.test");
        assert_eq!(created.display_name, "Ada Lovelace");
        assert_eq!(created.directory_dn.as_deref(), Some(DN));
        assert_eq!(created.roles, vec!["developer".to_string()]);
        assert!(created.password_hash.is_none());

        let mut bob = import("bob", "uid=bob,ou=people,dc=example,dc=com");
        bob.email = None;
        bob.display_name = None;
        bob.roles = vec!["admin".into()];
        let bob = sync.import_from_directory(&bob).await.unwrap();
        assert_eq!(bob.email, "bob@example.com");
        assert_eq!(bob.display_name, "bob");
        assert_eq!(bob.roles, vec!["admin".to_string()]);
        assert!(sync.locks.is_empty());
    }

    #[tokio::test]
    async fn import_refuses_active_matches() {
        let store = Arc::new(MemoryIdentityStore::new());
        let sync = synchronizer(store.clone());
        sync.import_from_directory(&import("ada", DN)).await.unwrap();

        assert!(matches!(
            sync.import_from_directory(&import("ada", DN)).await,
            Err(ImportError::UsernameActive(name)) if name == "ada"
        ));
        assert!(matches!(
            sync.import_from_directory(&import("lovelace", &DN.to_uppercase())).await,
            Err(ImportError::DistinguishedNameActive(_))
        ));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn import_reactivates_by_username() {
        let store = Arc::new(MemoryIdentityStore::new());
        let mut old = Identity::new("ada", "ada@old.test", "Ada", Utc::now());
        old.password_hash = Some("$2b$10$abcdefghijklmnopqrstuv".into());
        old.active = false;
        old.roles = vec!["viewer".into()];
        store.save(&old).await.unwrap();

        let mut entry = import("ada", DN);
        entry.roles = vec!["admin".into()];
        let revived = synchronizer(store.clone())
            .import_from_directory(&entry)
            .await
            .unwrap();
        assert_eq!(revived.id, old.id);
        assert!(revived.active);
        assert!(revived.password_hash.is_none());
        assert_eq!(revived.email, "ada@corp.test");
        assert_eq!(revived.directory_dn.as_deref(), Some(DN));
        assert_eq!(revived.roles, vec!["admin".to_string()]);
    }

    #[tokio::test]
    async fn import_reactivates_by_dn_under_new_username() {
        let store = Arc::new(MemoryIdentityStore::new());
        let mut old = Identity::new("alovelace", "ada@corp.test", "Ada", Utc::now());
        old.directory_dn = Some(DN.into());
        old.active = false;
        old.roles = vec!["viewer".into()];
        store.save(&old).await.unwrap();

        let revived = synchronizer(store.clone())
            .import_from_directory(&import("ada", DN))
            .await
            .unwrap();
        assert_eq!(revived.id, old.id);
        assert_eq!(revived.username, "ada");
        assert_eq!(revived.roles, vec!["viewer".to_string()]);
        assert!(store.find_by_username("alovelace").await.unwrap().is_none());
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn separate_synchronizers_converge_through_conflict_retry() {
        let store = Arc::new(MemoryIdentityStore::new());
        let a = Arc::new(synchronizer(store.clone()));
        let b = Arc::new(synchronizer(store.clone()));

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let sync = if i % 2 == 0 { a.clone() } else { b.clone() };
                tokio::spawn(async move { sync.sync_from_directory("ada", Some(DN)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.count().await, 1);
    }
}
