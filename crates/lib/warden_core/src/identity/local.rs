//! Locally managed accounts: registration and password changes.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::info;

use super::{Identity, IdentityStore};
use crate::auth::password::{PasswordError, hash_password, verify_password};
use crate::clock::Clock;
use crate::directory::sanitize::sanitize_username;
use crate::store::StoreError;

/// Minimum length of a local password.
pub const MIN_PASSWORD_LEN: usize = 8;

/// bcrypt only reads the first 72 bytes of its input.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Account management errors.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Username already registered")]
    UsernameTaken,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Identity not found")]
    NotFound,

    #[error("Identity has no local password")]
    NoLocalCredential,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Registration request.
#[derive(Debug)]
pub struct NewLocalAccount {
    pub username: String,
    pub email: String,
    /// Defaults to the username.
    pub display_name: Option<String>,
    pub password: SecretString,
    pub roles: Vec<String>,
}

/// Complexity rules for a new local password, checked in order.
fn check_password(password: &SecretString) -> Result<(), AccountError> {
    let password = password.expose_secret();
    let rule = if password.chars().count() < MIN_PASSWORD_LEN {
        format!("Password must be at least {MIN_PASSWORD_LEN} characters long")
    } else if password.len() > MAX_PASSWORD_BYTES {
        format!("Password must be at most {MAX_PASSWORD_BYTES} bytes long")
    } else if !password.chars().any(|c| c.is_lowercase()) {
        "Password must contain at least one lowercase letter".to_string()
    } else if !password.chars().any(|c| c.is_uppercase()) {
        "Password must contain at least one uppercase letter".to_string()
    } else if !password.chars().any(|c| c.is_ascii_digit()) {
        "Password must contain at least one digit".to_string()
    } else {
        return Ok(());
    };
    Err(AccountError::Validation(rule))
}

/// Local account operations.
pub struct LocalAccounts {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
}

impl LocalAccounts {
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create an identity that logs in with a local password.
    pub async fn register_local(&self, account: NewLocalAccount) -> Result<Identity, AccountError> {
        let username = sanitize_username(&account.username)
            .map_err(|e| AccountError::Validation(e.to_string()))?;
        let email = account.email.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(AccountError::Validation("A valid email is required".into()));
        }
        check_password(&account.password)?;

        if self.store.exists_by_username(&username).await? {
            return Err(AccountError::UsernameTaken);
        }
        if self.store.exists_by_email(&email).await? {
            return Err(AccountError::EmailTaken);
        }

        let display_name = account
            .display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| username.clone());
        let mut identity = Identity::new(&username, email, display_name, self.clock.now());
        identity.password_hash = Some(hash_password(account.password.expose_secret())?);
        identity.roles = account.roles;

        let saved = self.store.save(&identity).await.map_err(|e| match e {
            StoreError::Conflict(c) if c.contains("email") => AccountError::EmailTaken,
            StoreError::Conflict(_) => AccountError::UsernameTaken,
            other => AccountError::Store(other),
        })?;
        info!(username = %saved.username, "registered local identity");
        Ok(saved)
    }

    /// Replace the local password after checking the current one.
    pub async fn change_password(
        &self,
        username: &str,
        current: &SecretString,
        new: &SecretString,
    ) -> Result<(), AccountError> {
        check_password(new)?;
        let mut identity = self
            .store
            .find_by_username(username)
            .await?
            .ok_or(AccountError::NotFound)?;
        let hash = identity.local_hash().ok_or(AccountError::NoLocalCredential)?;
        if !verify_password(current.expose_secret(), hash)? {
            return Err(AccountError::InvalidCredentials);
        }

        identity.password_hash = Some(hash_password(new.expose_secret())?);
        identity.updated_at = self.clock.now();
        self.store.save(&identity).await?;
        info!(username, "changed local password");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::memory::MemoryIdentityStore;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn accounts() -> (LocalAccounts, Arc<MemoryIdentityStore>) {
        let store = Arc::new(MemoryIdentityStore::new());
        (LocalAccounts::new(store.clone(), Arc::new(SystemClock)), store)
    }

    fn ada() -> NewLocalAccount {
        NewLocalAccount {
            username: "ada".into(),
            email: "ada@example.com".into(),
            display_name: None,
            password: secret("Analytical-Engine1"),
            roles: vec!["developer".into()],
        }
    }

    #[tokio::test]
    async fn register_hashes_password() {
        let (accounts, _) = accounts();
        let identity = accounts.register_local(ada()).await.unwrap();
        assert_eq!(identity.display_name, "ada");
        let hash = identity.local_hash().unwrap();
        assert_ne!(hash, "Analytical-Engine1");
        assert!(verify_password("Analytical-Engine1", hash).unwrap());
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let (accounts, store) = accounts();
        let mut req = ada();
        req.password = secret("short");
        assert!(matches!(
            accounts.register_local(req).await,
            Err(AccountError::Validation(_))
        ));
        assert_eq!(store.count().await, 0);
    }

    fn rejection(password: &str) -> String {
        match check_password(&secret(password)) {
            Err(AccountError::Validation(msg)) => msg,
            other => panic!("expected validation error for {password:?}, got {other:?}"),
        }
    }

    #[test]
    fn each_password_rule_has_its_own_message() {
        assert_eq!(rejection("Ab1"), "Password must be at least 8 characters long");
        assert_eq!(
            rejection("ALLCAPS-123"),
            "Password must contain at least one lowercase letter"
        );
        assert_eq!(
            rejection("lowercase-123"),
            "Password must contain at least one uppercase letter"
        );
        assert_eq!(
            rejection("No-Digits-Here"),
            "Password must contain at least one digit"
        );
        assert!(check_password(&secret("Analytical-Engine1")).is_ok());
    }

    #[test]
    fn password_longer_than_bcrypt_input_is_rejected() {
        let at_limit = format!("Aa1{}", "x".repeat(MAX_PASSWORD_BYTES - 3));
        assert!(check_password(&secret(&at_limit)).is_ok());

        let over = format!("{at_limit}y");
        assert_eq!(rejection(&over), "Password must be at most 72 bytes long");

        // Multibyte characters count by encoded length.
        let wide = format!("Aa1{}", "é".repeat(35));
        assert_eq!(wide.len(), 73);
        assert_eq!(rejection(&wide), "Password must be at most 72 bytes long");
    }

    #[tokio::test]
    async fn long_passwords_never_reach_the_hash() {
        let (accounts, store) = accounts();
        let shared = "Aa1".to_string() + &"z".repeat(MAX_PASSWORD_BYTES - 3);
        let mut req = ada();
        req.password = secret(&format!("{shared}-tail-one"));
        assert!(matches!(
            accounts.register_local(req).await,
            Err(AccountError::Validation(_))
        ));
        assert_eq!(store.count().await, 0);

        accounts.register_local(ada()).await.unwrap();
        assert!(matches!(
            accounts
                .change_password(
                    "ada",
                    &secret("Analytical-Engine1"),
                    &secret(&format!("{shared}-tail-two")),
                )
                .await,
            Err(AccountError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn register_rejects_bad_username() {
        let (accounts, _) = accounts();
        let mut req = ada();
        req.username = "ada*".into();
        assert!(matches!(
            accounts.register_local(req).await,
            Err(AccountError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn register_rejects_duplicates() {
        let (accounts, _) = accounts();
        accounts.register_local(ada()).await.unwrap();
        assert!(matches!(
            accounts.register_local(ada()).await,
            Err(AccountError::UsernameTaken)
        ));

        let mut other = ada();
        other.username = "ada2".into();
        assert!(matches!(
            accounts.register_local(other).await,
            Err(AccountError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn change_password_requires_current() {
        let (accounts, store) = accounts();
        accounts.register_local(ada()).await.unwrap();

        assert!(matches!(
            accounts
                .change_password("ada", &secret("Wrong-Password3"), &secret("New-Password2"))
                .await,
            Err(AccountError::InvalidCredentials)
        ));

        accounts
            .change_password("ada", &secret("Analytical-Engine1"), &secret("New-Password2"))
            .await
            .unwrap();
        let stored = store.find_by_username("ada").await.unwrap().unwrap();
        assert!(verify_password("New-Password2", stored.local_hash().unwrap()).unwrap());
    }

    #[tokio::test]
    async fn change_password_for_directory_identity() {
        let (accounts, store) = accounts();
        let mut identity = Identity::new("bob", "bob@example.com", "bob", chrono::Utc::now());
        identity.directory_dn = Some("uid=bob,dc=example,dc=com".into());
        store.save(&identity).await.unwrap();

        assert!(matches!(
            accounts
                .change_password("bob", &secret("whatever1"), &secret("New-Password2"))
                .await,
            Err(AccountError::NoLocalCredential)
        ));
        assert!(matches!(
            accounts
                .change_password("nobody", &secret("whatever1"), &secret("New-Password2"))
                .await,
            Err(AccountError::NotFound)
        ));
    }
}
