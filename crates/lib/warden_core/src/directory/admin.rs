//! Directory administration: user search, import and connection checks.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::sanitize::sanitize_username;
use super::settings::{DirectorySettingsService, SettingsError, UpdateDirectorySettings};
use super::{Directory, DirectoryError, DirectoryUser};
use crate::identity::{DirectoryImport, Identity, IdentitySynchronizer, ImportError};
use crate::models::directory::ConnectionReport;
use crate::store::StoreError;

/// Administration errors.
#[derive(Debug, Error)]
pub enum DirectoryAdminError {
    #[error("Directory is not enabled")]
    Disabled,

    #[error("No directory settings saved")]
    NotConfigured,

    #[error("No directory entry for {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Operations an administrator runs against the directory.
pub struct DirectoryAdmin {
    directory: Arc<dyn Directory>,
    settings: Arc<DirectorySettingsService>,
    synchronizer: Arc<IdentitySynchronizer>,
}

fn clean_roles(roles: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(roles.len());
    for role in roles.into_iter().map(|r| r.trim().to_string()) {
        if !role.is_empty() && !cleaned.contains(&role) {
            cleaned.push(role);
        }
    }
    cleaned
}

impl DirectoryAdmin {
    pub fn new(
        directory: Arc<dyn Directory>,
        settings: Arc<DirectorySettingsService>,
        synchronizer: Arc<IdentitySynchronizer>,
    ) -> Self {
        Self {
            directory,
            settings,
            synchronizer,
        }
    }

    /// Entries matching `username`. Empty when the directory is disabled.
    pub async fn search(&self, username: &str) -> Result<Vec<DirectoryUser>, DirectoryAdminError> {
        let username = sanitize_username(username)?;
        let Some(settings) = self.settings.active().await? else {
            debug!(%username, "directory disabled, search skipped");
            return Ok(Vec::new());
        };
        let users = self.directory.search_users(&username, &settings).await?;
        debug!(%username, matches = users.len(), "directory user search");
        Ok(users)
    }

    /// Create or reactivate the local identity for `username`.
    ///
    /// The entry is looked up again so the stored DN and attributes come
    /// from the directory. With several matches the first one wins.
    pub async fn import(
        &self,
        username: &str,
        roles: Vec<String>,
    ) -> Result<Identity, DirectoryAdminError> {
        let username = sanitize_username(username)?;
        let settings = self
            .settings
            .active()
            .await?
            .ok_or(DirectoryAdminError::Disabled)?;
        let entry = self
            .directory
            .search_users(&username, &settings)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryAdminError::UnknownUser(username.clone()))?;

        let identity = self
            .synchronizer
            .import_from_directory(&DirectoryImport {
                username,
                distinguished_name: entry.distinguished_name,
                email: entry.email,
                display_name: entry.display_name,
                roles: clean_roles(roles),
            })
            .await?;
        info!(username = %identity.username, "imported directory identity");
        Ok(identity)
    }

    /// Bind with `candidate` settings, or the saved ones when `None`, and
    /// read the root entry. Directory failures are reported, not raised.
    pub async fn test_connection(
        &self,
        candidate: Option<UpdateDirectorySettings>,
    ) -> Result<ConnectionReport, DirectoryAdminError> {
        let settings = match candidate {
            Some(request) => self.settings.candidate(request).await?,
            None => self
                .settings
                .saved()
                .await?
                .ok_or(DirectoryAdminError::NotConfigured)?,
        };

        let report = match self.directory.test_connection(&settings).await {
            Ok(check) if check.user_search_base_found => ConnectionReport {
                success: true,
                message: "Directory connection succeeded".into(),
                details: None,
            },
            Ok(_) => ConnectionReport {
                success: true,
                message: format!(
                    "Directory connection succeeded, but user search base {} was not found",
                    settings.effective_search_base()
                ),
                details: None,
            },
            Err(e) => {
                warn!(urls = %settings.urls, "directory connection test failed: {e}");
                ConnectionReport {
                    success: false,
                    message: "Directory connection failed".into(),
                    details: Some(e.to_string()),
                }
            }
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use super::*;
    use crate::clock::SystemClock;
    use crate::crypto::SecretCodec;
    use crate::directory::{ConnectionCheck, DirectoryOutcome, DirectorySettings};
    use crate::identity::{IdentityStore, SyncPolicy};
    use crate::memory::{MemoryDirectorySettingsStore, MemoryIdentityStore};

    const ADA_DN: &str = "uid=ada,ou=people,dc=example,dc=com";

    /// Directory holding a fixed set of entries.
    #[derive(Default)]
    struct FakeDirectory {
        users: Vec<DirectoryUser>,
        search_base_missing: bool,
        down: bool,
        tested: Mutex<Vec<DirectorySettings>>,
    }

    #[async_trait]
    impl Directory for FakeDirectory {
        async fn authenticate(
            &self,
            _username: &str,
            _password: &str,
            _settings: &DirectorySettings,
        ) -> DirectoryOutcome {
            DirectoryOutcome::BadCredentials
        }

        async fn find_distinguished_name(
            &self,
            _username: &str,
            _settings: &DirectorySettings,
        ) -> Result<Option<String>, DirectoryError> {
            Ok(None)
        }

        async fn search_users(
            &self,
            username: &str,
            _settings: &DirectorySettings,
        ) -> Result<Vec<DirectoryUser>, DirectoryError> {
            if self.down {
                return Err(DirectoryError::Connection("connection refused".into()));
            }
            Ok(self
                .users
                .iter()
                .filter(|u| u.username == username)
                .cloned()
                .collect())
        }

        async fn test_connection(
            &self,
            settings: &DirectorySettings,
        ) -> Result<ConnectionCheck, DirectoryError> {
            self.tested.lock().unwrap().push(settings.clone());
            if self.down {
                return Err(DirectoryError::Connection("connection refused".into()));
            }
            Ok(ConnectionCheck {
                user_search_base_found: !self.search_base_missing,
            })
        }
    }

    fn ada_entry() -> DirectoryUser {
        DirectoryUser {
            username: "ada".into(),
            distinguished_name: ADA_DN.into(),
            email: Some("ada@corp.test".into()),
            display_name: Some("Ada Lovelace".into()),
        }
    }

    struct Harness {
        admin: DirectoryAdmin,
        settings: Arc<DirectorySettingsService>,
        identities: Arc<MemoryIdentityStore>,
        directory: Arc<FakeDirectory>,
    }

    fn harness(directory: FakeDirectory) -> Harness {
        let codec = Arc::new(SecretCodec::new(&SecretString::from(
            "admin-test-key".to_string(),
        )));
        let settings = Arc::new(DirectorySettingsService::new(
            Arc::new(MemoryDirectorySettingsStore::new()),
            codec,
            Arc::new(SystemClock),
        ));
        let identities = Arc::new(MemoryIdentityStore::new());
        let synchronizer = Arc::new(IdentitySynchronizer::new(
            identities.clone(),
            Arc::new(SystemClock),
            SyncPolicy::default(),
        ));
        let directory = Arc::new(directory);
        Harness {
            admin: DirectoryAdmin::new(directory.clone(), settings.clone(), synchronizer),
            settings,
            identities,
            directory,
        }
    }

    fn settings_request(enabled: bool) -> UpdateDirectorySettings {
        UpdateDirectorySettings {
            urls: "ldap://dir:389".into(),
            base: "dc=example,dc=com".into(),
            bind_username: Some("cn=svc,dc=example,dc=com".into()),
            bind_password: Some(SecretString::from("bind-pw".to_string())),
            user_search_base: Some("ou=people".into()),
            user_search_filter: None,
            enabled,
        }
    }

    async fn enabled(directory: FakeDirectory) -> Harness {
        let h = harness(directory);
        h.settings.update(settings_request(true)).await.unwrap();
        h
    }

    #[tokio::test]
    async fn search_returns_entries() {
        let h = enabled(FakeDirectory {
            users: vec![ada_entry()],
            ..Default::default()
        })
        .await;
        let found = h.admin.search(" ADA ").await.unwrap();
        assert_eq!(found, vec![ada_entry()]);
        assert!(h.admin.search("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_is_empty_while_disabled() {
        let h = harness(FakeDirectory {
            users: vec![ada_entry()],
            ..Default::default()
        });
        assert!(h.admin.search("ada").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_rejects_malformed_names() {
        let h = enabled(FakeDirectory::default()).await;
        assert!(matches!(
            h.admin.search("ada)(uid=*").await,
            Err(DirectoryAdminError::Directory(DirectoryError::InvalidUsername(_)))
        ));
    }

    #[tokio::test]
    async fn import_uses_directory_attributes() {
        let h = enabled(FakeDirectory {
            users: vec![ada_entry()],
            ..Default::default()
        })
        .await;
        let identity = h
            .admin
            .import("Ada", vec![" admin ".into(), String::new(), "admin".into()])
            .await
            .unwrap();
        assert_eq!(identity.username, "ada");
        assert_eq!(identity.email, "ada@corp.test");
        assert_eq!(identity.display_name, "Ada Lovelace");
        assert_eq!(identity.directory_dn.as_deref(), Some(ADA_DN));
        assert_eq!(identity.roles, vec!["admin".to_string()]);
        assert!(identity.is_directory_backed());
        assert_eq!(h.identities.count().await, 1);

        assert!(matches!(
            h.admin.import("ada", Vec::new()).await,
            Err(DirectoryAdminError::Import(ImportError::UsernameActive(_)))
        ));
    }

    #[tokio::test]
    async fn import_reactivates_inactive_identity() {
        let h = enabled(FakeDirectory {
            users: vec![ada_entry()],
            ..Default::default()
        })
        .await;
        let mut old = Identity::new("ada", "ada@old.test", "Ada", chrono::Utc::now());
        old.active = false;
        old.password_hash = Some("$2b$04$abcdefghijklmnopqrstuv".into());
        old.roles = vec!["viewer".into()];
        h.identities.save(&old).await.unwrap();

        let revived = h.admin.import("ada", Vec::new()).await.unwrap();
        assert_eq!(revived.id, old.id);
        assert!(revived.active);
        assert!(revived.password_hash.is_none());
        assert_eq!(revived.roles, vec!["viewer".to_string()]);
    }

    #[tokio::test]
    async fn import_needs_an_enabled_directory_and_a_match() {
        let disabled = harness(FakeDirectory {
            users: vec![ada_entry()],
            ..Default::default()
        });
        assert!(matches!(
            disabled.admin.import("ada", Vec::new()).await,
            Err(DirectoryAdminError::Disabled)
        ));

        let h = enabled(FakeDirectory::default()).await;
        assert!(matches!(
            h.admin.import("ada", Vec::new()).await,
            Err(DirectoryAdminError::UnknownUser(name)) if name == "ada"
        ));

        let down = enabled(FakeDirectory {
            down: true,
            ..Default::default()
        })
        .await;
        assert!(matches!(
            down.admin.import("ada", Vec::new()).await,
            Err(DirectoryAdminError::Directory(DirectoryError::Connection(_)))
        ));
        assert_eq!(down.identities.count().await, 0);
    }

    #[tokio::test]
    async fn connection_test_uses_saved_or_candidate_settings() {
        let h = harness(FakeDirectory::default());
        assert!(matches!(
            h.admin.test_connection(None).await,
            Err(DirectoryAdminError::NotConfigured)
        ));

        h.settings.update(settings_request(false)).await.unwrap();
        let report = h.admin.test_connection(None).await.unwrap();
        assert!(report.success);
        assert_eq!(report.details, None);

        let mut candidate = settings_request(true);
        candidate.urls = "ldap://candidate:389".into();
        candidate.bind_password = None;
        h.admin.test_connection(Some(candidate)).await.unwrap();

        let tested = h.directory.tested.lock().unwrap().clone();
        assert_eq!(tested.len(), 2);
        assert_eq!(tested[0].urls, "ldap://dir:389");
        assert_eq!(tested[1].urls, "ldap://candidate:389");
        assert!(tested[1].bind_password_encrypted.is_some());
        // The candidate is never persisted.
        assert_eq!(h.settings.current().await.unwrap().urls, "ldap://dir:389");
    }

    #[tokio::test]
    async fn connection_failures_are_reported() {
        let down = enabled(FakeDirectory {
            down: true,
            ..Default::default()
        })
        .await;
        let report = down.admin.test_connection(None).await.unwrap();
        assert!(!report.success);
        assert!(report.details.unwrap().contains("connection refused"));

        let partial = enabled(FakeDirectory {
            search_base_missing: true,
            ..Default::default()
        })
        .await;
        let report = partial.admin.test_connection(None).await.unwrap();
        assert!(report.success);
        assert!(report.message.contains("ou=people,dc=example,dc=com"));
    }

    #[tokio::test]
    async fn invalid_candidate_is_a_settings_error() {
        let h = harness(FakeDirectory::default());
        let mut candidate = settings_request(true);
        candidate.base = String::new();
        assert!(matches!(
            h.admin.test_connection(Some(candidate)).await,
            Err(DirectoryAdminError::Settings(SettingsError::Validation(_)))
        ));
        assert!(h.directory.tested.lock().unwrap().is_empty());
    }
}
