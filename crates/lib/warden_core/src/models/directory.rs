//! Directory connection settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter template used when none is configured. `{0}` is the escaped username.
pub const DEFAULT_USER_SEARCH_FILTER: &str = "(uid={0})";

/// Stored directory configuration. At most one row is enabled at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySettings {
    pub id: i64,
    /// One or more endpoints, separated by spaces or commas, tried in order.
    pub urls: String,
    /// Root DN.
    pub base: String,
    /// Service account DN used for the search bind. Anonymous when absent.
    pub bind_username: Option<String>,
    /// Bind password encrypted with the secret codec.
    pub bind_password_encrypted: Option<String>,
    pub user_search_base: Option<String>,
    pub user_search_filter: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DirectorySettings {
    /// Endpoint list in configured order.
    pub fn endpoints(&self) -> Vec<&str> {
        self.urls
            .split([' ', ','])
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .collect()
    }

    /// Search scope for user lookups.
    ///
    /// A user-search base that does not already end with the root DN is
    /// treated as relative to it.
    pub fn effective_search_base(&self) -> String {
        let base = self.base.trim();
        match self.user_search_base.as_deref().map(str::trim) {
            Some(usb) if !usb.is_empty() => {
                if base.is_empty() || usb.to_ascii_lowercase().ends_with(&base.to_ascii_lowercase())
                {
                    usb.to_string()
                } else {
                    format!("{usb},{base}")
                }
            }
            _ => base.to_string(),
        }
    }

    /// Filter template with `{0}` placeholder.
    pub fn filter_template(&self) -> &str {
        self.user_search_filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_USER_SEARCH_FILTER)
    }
}

/// Settings as shown to administrators. Never carries the bind password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySettingsView {
    pub urls: String,
    pub base: String,
    pub bind_username: Option<String>,
    pub has_bind_password: bool,
    pub user_search_base: Option<String>,
    pub user_search_filter: Option<String>,
    pub enabled: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&DirectorySettings> for DirectorySettingsView {
    fn from(s: &DirectorySettings) -> Self {
        Self {
            urls: s.urls.clone(),
            base: s.base.clone(),
            bind_username: s.bind_username.clone(),
            has_bind_password: s
                .bind_password_encrypted
                .as_deref()
                .is_some_and(|p| !p.is_empty()),
            user_search_base: s.user_search_base.clone(),
            user_search_filter: s.user_search_filter.clone(),
            enabled: s.enabled,
            updated_at: Some(s.updated_at),
        }
    }
}

impl Default for DirectorySettingsView {
    fn default() -> Self {
        Self {
            urls: String::new(),
            base: String::new(),
            bind_username: None,
            has_bind_password: false,
            user_search_base: None,
            user_search_filter: None,
            enabled: false,
            updated_at: None,
        }
    }
}

/// Directory entry returned by a user search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    /// `uid` of the entry, lowercased.
    pub username: String,
    pub distinguished_name: String,
    /// `mail`, when the entry has one.
    pub email: Option<String>,
    /// `cn`, when the entry has one.
    pub display_name: Option<String>,
}

/// Outcome of a directory connection check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DirectorySettings {
        let now = Utc::now();
        DirectorySettings {
            id: 1,
            urls: "ldap://a:389, ldap://b:389".into(),
            base: "dc=example,dc=com".into(),
            bind_username: None,
            bind_password_encrypted: None,
            user_search_base: None,
            user_search_filter: None,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn search_base_defaults_to_root() {
        assert_eq!(settings().effective_search_base(), "dc=example,dc=com");
    }

    #[test]
    fn relative_search_base_is_joined() {
        let mut s = settings();
        s.user_search_base = Some("ou=people".into());
        assert_eq!(s.effective_search_base(), "ou=people,dc=example,dc=com");

        s.user_search_base = Some("ou=people,DC=example,DC=com".into());
        assert_eq!(s.effective_search_base(), "ou=people,DC=example,DC=com");
    }

    #[test]
    fn endpoints_split_on_spaces_and_commas() {
        assert_eq!(settings().endpoints(), vec!["ldap://a:389", "ldap://b:389"]);
    }

    #[test]
    fn filter_template_falls_back() {
        let mut s = settings();
        assert_eq!(s.filter_template(), "(uid={0})");
        s.user_search_filter = Some("(sAMAccountName={0})".into());
        assert_eq!(s.filter_template(), "(sAMAccountName={0})");
    }
}
