//! Identity and authentication domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::uuid::uuidv7;

/// Local representation of a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: String,
    /// Directory DN. Set iff the identity came from, or was last confirmed
    /// by, the directory.
    pub directory_dn: Option<String>,
    /// bcrypt hash. Present iff password login is permitted.
    pub password_hash: Option<String>,
    pub active: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// A fresh, active identity with no credentials attached.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        display_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuidv7(),
            username: username.into(),
            email: email.into(),
            display_name: display_name.into(),
            directory_dn: None,
            password_hash: None,
            active: true,
            roles: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The usable local hash, if any. Empty strings count as absent.
    pub fn local_hash(&self) -> Option<&str> {
        self.password_hash.as_deref().filter(|h| !h.is_empty())
    }

    /// Whether any authentication path exists for this record.
    pub fn can_authenticate(&self) -> bool {
        self.local_hash().is_some() || self.directory_dn.is_some()
    }

    pub fn is_directory_backed(&self) -> bool {
        self.directory_dn.is_some()
    }

    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            roles: self.roles.clone(),
            directory_backed: self.is_directory_backed(),
            active: self.active,
        }
    }
}

/// Identity data safe to hand to an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub directory_backed: bool,
    pub active: bool,
}

/// Immutable record of one authentication try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    /// Normalized (trimmed, lowercased) username; the lockout key.
    pub username: String,
    pub ip_address: String,
    pub attempted_at: DateTime<Utc>,
    pub success: bool,
}

/// JWT claims embedded in session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: identity username (standard JWT `sub` claim).
    pub sub: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Caller-supplied claims.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
