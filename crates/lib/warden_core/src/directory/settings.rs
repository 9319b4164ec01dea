//! Administration of the directory configuration.
//!
//! The bind password is encrypted on the way in and never handed back out.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::info;

use super::{DirectorySettings, DirectorySettingsStore};
use crate::clock::Clock;
use crate::crypto::{CodecError, SecretCodec};
use crate::models::directory::DirectorySettingsView;
use crate::store::StoreError;

/// Settings administration errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Replacement configuration submitted by an administrator.
#[derive(Debug)]
pub struct UpdateDirectorySettings {
    pub urls: String,
    pub base: String,
    pub bind_username: Option<String>,
    /// New bind password. `None` or empty keeps the stored one.
    pub bind_password: Option<SecretString>,
    pub user_search_base: Option<String>,
    pub user_search_filter: Option<String>,
    pub enabled: bool,
}

/// Reads and replaces the directory configuration.
pub struct DirectorySettingsService {
    store: Arc<dyn DirectorySettingsStore>,
    codec: Arc<SecretCodec>,
    clock: Arc<dyn Clock>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl DirectorySettingsService {
    pub fn new(
        store: Arc<dyn DirectorySettingsStore>,
        codec: Arc<SecretCodec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            codec,
            clock,
        }
    }

    /// The active configuration, if the directory is enabled.
    pub async fn active(&self) -> Result<Option<DirectorySettings>, StoreError> {
        Ok(self.store.active().await?.filter(|s| s.enabled))
    }

    /// Current configuration for display. Disabled defaults when none exists.
    pub async fn current(&self) -> Result<DirectorySettingsView, SettingsError> {
        let view = match self.store.active().await? {
            Some(active) => DirectorySettingsView::from(&active),
            None => self
                .store
                .latest()
                .await?
                .as_ref()
                .map(DirectorySettingsView::from)
                .unwrap_or_default(),
        };
        Ok(view)
    }

    /// Replace the stored configuration.
    pub async fn update(
        &self,
        request: UpdateDirectorySettings,
    ) -> Result<DirectorySettingsView, SettingsError> {
        let settings = self.merge(request).await?;
        let saved = self.store.save(&settings).await?;
        info!(enabled = saved.enabled, urls = %saved.urls, "directory settings updated");
        Ok(DirectorySettingsView::from(&saved))
    }

    /// The configuration `request` would produce, without saving it.
    ///
    /// An omitted bind password falls back to the stored one.
    pub async fn candidate(
        &self,
        request: UpdateDirectorySettings,
    ) -> Result<DirectorySettings, SettingsError> {
        self.merge(request).await
    }

    /// The stored configuration (enabled or not), if any.
    pub async fn saved(&self) -> Result<Option<DirectorySettings>, StoreError> {
        match self.store.active().await? {
            Some(s) => Ok(Some(s)),
            None => self.store.latest().await,
        }
    }

    async fn merge(
        &self,
        request: UpdateDirectorySettings,
    ) -> Result<DirectorySettings, SettingsError> {
        let urls = request.urls.trim().to_string();
        let base = request.base.trim().to_string();
        if request.enabled && (urls.is_empty() || base.is_empty()) {
            return Err(SettingsError::Validation(
                "urls and base are required to enable the directory".into(),
            ));
        }
        if let Some(filter) = request.user_search_filter.as_deref()
            && !filter.trim().is_empty()
            && !filter.contains("{0}")
        {
            return Err(SettingsError::Validation(
                "user search filter must contain the {0} placeholder".into(),
            ));
        }

        let now = self.clock.now();
        let mut settings = self.saved().await?.unwrap_or_else(|| DirectorySettings {
            id: 0,
            urls: String::new(),
            base: String::new(),
            bind_username: None,
            bind_password_encrypted: None,
            user_search_base: None,
            user_search_filter: None,
            enabled: false,
            created_at: now,
            updated_at: now,
        });

        settings.urls = urls;
        settings.base = base;
        settings.bind_username = non_empty(request.bind_username);
        settings.user_search_base = non_empty(request.user_search_base);
        settings.user_search_filter = non_empty(request.user_search_filter);
        settings.enabled = request.enabled;
        settings.updated_at = now;

        if let Some(password) = request.bind_password
            && !password.expose_secret().is_empty()
        {
            settings.bind_password_encrypted =
                Some(self.codec.encrypt(password.expose_secret())?);
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::memory::MemoryDirectorySettingsStore;

    fn service() -> (DirectorySettingsService, Arc<MemoryDirectorySettingsStore>, Arc<SecretCodec>) {
        let store = Arc::new(MemoryDirectorySettingsStore::new());
        let codec = Arc::new(SecretCodec::new(&SecretString::from(
            "settings-test-key".to_string(),
        )));
        let svc = DirectorySettingsService::new(store.clone(), codec.clone(), Arc::new(SystemClock));
        (svc, store, codec)
    }

    fn request(password: Option<&str>) -> UpdateDirectorySettings {
        UpdateDirectorySettings {
            urls: "ldap://dir:389".into(),
            base: "dc=example,dc=com".into(),
            bind_username: Some("cn=svc,dc=example,dc=com".into()),
            bind_password: password.map(|p| SecretString::from(p.to_string())),
            user_search_base: Some("ou=people".into()),
            user_search_filter: None,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn no_settings_reads_as_disabled() {
        let (svc, _, _) = service();
        let view = svc.current().await.unwrap();
        assert!(!view.enabled);
        assert!(svc.active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn password_is_encrypted_and_hidden() {
        let (svc, store, codec) = service();
        let view = svc.update(request(Some("bind-pw"))).await.unwrap();
        assert!(view.has_bind_password);

        let stored = store.active().await.unwrap().unwrap();
        let encrypted = stored.bind_password_encrypted.unwrap();
        assert_ne!(encrypted, "bind-pw");
        assert_eq!(codec.decrypt(&encrypted).unwrap(), "bind-pw");
    }

    #[tokio::test]
    async fn empty_password_keeps_stored_one() {
        let (svc, store, _) = service();
        svc.update(request(Some("bind-pw"))).await.unwrap();
        let first = store.active().await.unwrap().unwrap();

        svc.update(request(Some(""))).await.unwrap();
        let second = store.active().await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.bind_password_encrypted, second.bind_password_encrypted);
    }

    #[tokio::test]
    async fn candidate_is_not_saved() {
        let (svc, store, codec) = service();
        svc.update(request(Some("bind-pw"))).await.unwrap();

        let mut req = request(None);
        req.urls = "ldap://other:389".into();
        let candidate = svc.candidate(req).await.unwrap();
        assert_eq!(candidate.urls, "ldap://other:389");
        let encrypted = candidate.bind_password_encrypted.unwrap();
        assert_eq!(codec.decrypt(&encrypted).unwrap(), "bind-pw");

        let stored = store.active().await.unwrap().unwrap();
        assert_eq!(stored.urls, "ldap://dir:389");
    }

    #[tokio::test]
    async fn enabling_requires_urls_and_base() {
        let (svc, _, _) = service();
        let mut req = request(None);
        req.urls = "  ".into();
        assert!(matches!(
            svc.update(req).await,
            Err(SettingsError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn disabling_hides_active_settings() {
        let (svc, _, _) = service();
        svc.update(request(Some("pw"))).await.unwrap();
        let mut req = request(None);
        req.enabled = false;
        let view = svc.update(req).await.unwrap();
        assert!(!view.enabled);
        assert!(view.has_bind_password);
        assert!(svc.active().await.unwrap().is_none());
    }
}
