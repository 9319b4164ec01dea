//! LDAP directory client built on `ldap3`.
//!
//! Flow per call: connect to the first reachable endpoint, bind as the
//! service account (or anonymously), search the user entry, then re-bind as
//! that entry with the supplied password. The whole exchange runs under one
//! timeout. User search and connection checks reuse the connect and
//! service-bind steps.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use tracing::{debug, error, warn};

use super::sanitize::{build_user_filter, sanitize_username};
use super::{
    ConnectionCheck, Directory, DirectoryError, DirectoryOutcome, DirectorySettings, DirectoryUser,
};
use crate::crypto::SecretCodec;

/// Default bound on a whole directory exchange.
pub const DEFAULT_DIRECTORY_TIMEOUT: Duration = Duration::from_secs(5);

/// LDAP result code for `invalidCredentials`.
const RC_INVALID_CREDENTIALS: u32 = 49;

/// LDAP result code for `noSuchObject`.
const RC_NO_SUCH_OBJECT: u32 = 32;

/// Attribute list that asks the server for no attributes (RFC 4511).
const NO_ATTRIBUTES: &str = "1.1";

/// Attributes read for a user search.
const USER_ATTRIBUTES: [&str; 3] = ["uid", "mail", "cn"];

/// First non-empty value of `name`. Attribute names compare without case.
fn first_value(entry: &SearchEntry, name: &str) -> Option<String> {
    entry
        .attrs
        .iter()
        .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn directory_user(entry: SearchEntry, searched: &str) -> DirectoryUser {
    DirectoryUser {
        username: first_value(&entry, "uid")
            .map(|uid| uid.to_ascii_lowercase())
            .unwrap_or_else(|| searched.to_string()),
        email: first_value(&entry, "mail"),
        display_name: first_value(&entry, "cn"),
        distinguished_name: entry.dn,
    }
}

/// Production [`Directory`] talking LDAP.
pub struct LdapDirectory {
    codec: Arc<SecretCodec>,
    timeout: Duration,
}

impl LdapDirectory {
    pub fn new(codec: Arc<SecretCodec>, timeout: Duration) -> Self {
        Self { codec, timeout }
    }

    async fn connect(&self, settings: &DirectorySettings) -> Result<Ldap, DirectoryError> {
        let mut last_error = None;
        for url in settings.endpoints() {
            let conn_settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
            match LdapConnAsync::with_settings(conn_settings, url).await {
                Ok((conn, ldap)) => {
                    tokio::spawn(async move {
                        if let Err(e) = conn.drive().await {
                            debug!("directory connection closed: {e}");
                        }
                    });
                    return Ok(ldap);
                }
                Err(e) => {
                    warn!(url, "directory endpoint unreachable: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(e) => DirectoryError::Connection(e.to_string()),
            None => DirectoryError::NotConfigured("no directory URL configured".into()),
        })
    }

    /// Bind as the configured service account. Anonymous when none is set.
    async fn service_bind(
        &self,
        ldap: &mut Ldap,
        settings: &DirectorySettings,
    ) -> Result<(), DirectoryError> {
        let Some(bind_dn) = settings
            .bind_username
            .as_deref()
            .map(str::trim)
            .filter(|dn| !dn.is_empty())
        else {
            return Ok(());
        };

        let encrypted = settings.bind_password_encrypted.as_deref().unwrap_or("");
        let password = self
            .codec
            .decrypt(encrypted)
            .map_err(|_| DirectoryError::CredentialUnavailable)?;
        if password.is_empty() {
            return Err(DirectoryError::CredentialUnavailable);
        }

        ldap.simple_bind(bind_dn, &password)
            .await
            .map_err(|e| DirectoryError::Protocol(e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::Protocol(format!("service bind rejected: {e}")))?;
        Ok(())
    }

    async fn search_dn(
        &self,
        ldap: &mut Ldap,
        filter: &str,
        settings: &DirectorySettings,
    ) -> Result<Option<String>, DirectoryError> {
        let base = settings.effective_search_base();
        let (entries, _) = ldap
            .search(&base, Scope::Subtree, filter, vec![NO_ATTRIBUTES])
            .await
            .map_err(|e| DirectoryError::Protocol(e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::Protocol(format!("search failed: {e}")))?;

        if entries.len() > 1 {
            warn!(
                base = %base,
                matches = entries.len(),
                "directory search matched several entries, using the first"
            );
        }
        Ok(entries
            .into_iter()
            .next()
            .map(|entry| SearchEntry::construct(entry).dn))
    }

    async fn lookup(
        &self,
        username: &str,
        settings: &DirectorySettings,
    ) -> Result<Option<String>, DirectoryError> {
        let username = sanitize_username(username)?;
        let filter = build_user_filter(settings.filter_template(), &username)?;
        let mut ldap = self.connect(settings).await?;
        let found: Result<Option<String>, DirectoryError> = async {
            self.service_bind(&mut ldap, settings).await?;
            self.search_dn(&mut ldap, &filter, settings).await
        }
        .await;
        let _ = ldap.unbind().await;
        found
    }

    async fn search_entries(
        &self,
        username: &str,
        settings: &DirectorySettings,
    ) -> Result<Vec<DirectoryUser>, DirectoryError> {
        let username = sanitize_username(username)?;
        let filter = build_user_filter(settings.filter_template(), &username)?;
        let mut ldap = self.connect(settings).await?;
        let found: Result<Vec<DirectoryUser>, DirectoryError> = async {
            self.service_bind(&mut ldap, settings).await?;
            let base = settings.effective_search_base();
            let (entries, _) = ldap
                .search(&base, Scope::Subtree, &filter, USER_ATTRIBUTES.to_vec())
                .await
                .map_err(|e| DirectoryError::Protocol(e.to_string()))?
                .success()
                .map_err(|e| DirectoryError::Protocol(format!("search failed: {e}")))?;
            Ok(entries
                .into_iter()
                .map(|entry| directory_user(SearchEntry::construct(entry), &username))
                .collect())
        }
        .await;
        let _ = ldap.unbind().await;
        found
    }

    /// Whether `dn` names an entry visible to the current bind.
    async fn entry_exists(&self, ldap: &mut Ldap, dn: &str) -> Result<bool, DirectoryError> {
        let result = ldap
            .search(dn, Scope::Base, "(objectClass=*)", vec![NO_ATTRIBUTES])
            .await
            .map_err(|e| DirectoryError::Protocol(e.to_string()))?;
        match result.1.rc {
            0 => Ok(!result.0.is_empty()),
            RC_NO_SUCH_OBJECT => Ok(false),
            rc => Err(DirectoryError::Protocol(format!(
                "reading {dn} failed with result code {rc}"
            ))),
        }
    }

    async fn check(&self, settings: &DirectorySettings) -> Result<ConnectionCheck, DirectoryError> {
        let base = settings.base.trim();
        if base.is_empty() {
            return Err(DirectoryError::NotConfigured("no base DN configured".into()));
        }
        let mut ldap = self.connect(settings).await?;
        let checked: Result<ConnectionCheck, DirectoryError> = async {
            self.service_bind(&mut ldap, settings).await?;
            if !self.entry_exists(&mut ldap, base).await? {
                return Err(DirectoryError::MissingEntry(base.to_string()));
            }
            let search_base = settings.effective_search_base();
            let user_search_base_found = search_base == base
                || self.entry_exists(&mut ldap, &search_base).await?;
            if !user_search_base_found {
                warn!(%search_base, "user search base not found");
            }
            Ok(ConnectionCheck {
                user_search_base_found,
            })
        }
        .await;
        let _ = ldap.unbind().await;
        checked
    }

    /// `Ok(Some(dn))` on success, `Ok(None)` for unknown user or wrong password.
    async fn verify(
        &self,
        username: &str,
        password: &str,
        settings: &DirectorySettings,
    ) -> Result<Option<String>, DirectoryError> {
        let username = sanitize_username(username)?;
        let filter = build_user_filter(settings.filter_template(), &username)?;
        let mut ldap = self.connect(settings).await?;

        let verified: Result<Option<String>, DirectoryError> = async {
            self.service_bind(&mut ldap, settings).await?;
            let Some(dn) = self.search_dn(&mut ldap, &filter, settings).await? else {
                debug!(%username, "no directory entry for user");
                return Ok(None);
            };

            let result = ldap
                .simple_bind(&dn, password)
                .await
                .map_err(|e| DirectoryError::Protocol(e.to_string()))?;
            match result.rc {
                0 => Ok(Some(dn)),
                RC_INVALID_CREDENTIALS => Ok(None),
                rc => Err(DirectoryError::Protocol(format!(
                    "user bind failed with result code {rc}"
                ))),
            }
        }
        .await;

        let _ = ldap.unbind().await;
        verified
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        settings: &DirectorySettings,
    ) -> DirectoryOutcome {
        // An empty simple bind is an unauthenticated bind; servers accept it.
        if password.is_empty() {
            return DirectoryOutcome::BadCredentials;
        }

        match tokio::time::timeout(self.timeout, self.verify(username, password, settings)).await {
            Ok(Ok(Some(distinguished_name))) => DirectoryOutcome::Success { distinguished_name },
            Ok(Ok(None)) => DirectoryOutcome::BadCredentials,
            Ok(Err(e)) => {
                error!(username, "directory authentication unavailable: {e}");
                DirectoryOutcome::TransportError(e)
            }
            Err(_) => {
                error!(username, timeout = ?self.timeout, "directory authentication timed out");
                DirectoryOutcome::TransportError(DirectoryError::Timeout(self.timeout))
            }
        }
    }

    async fn find_distinguished_name(
        &self,
        username: &str,
        settings: &DirectorySettings,
    ) -> Result<Option<String>, DirectoryError> {
        tokio::time::timeout(self.timeout, self.lookup(username, settings))
            .await
            .map_err(|_| DirectoryError::Timeout(self.timeout))?
    }

    async fn search_users(
        &self,
        username: &str,
        settings: &DirectorySettings,
    ) -> Result<Vec<DirectoryUser>, DirectoryError> {
        tokio::time::timeout(self.timeout, self.search_entries(username, settings))
            .await
            .map_err(|_| DirectoryError::Timeout(self.timeout))?
    }

    async fn test_connection(
        &self,
        settings: &DirectorySettings,
    ) -> Result<ConnectionCheck, DirectoryError> {
        tokio::time::timeout(self.timeout, self.check(settings))
            .await
            .map_err(|_| DirectoryError::Timeout(self.timeout))?
    }
}
