//! First-run administrator account.

use secrecy::SecretString;
use warden_core::directory::sanitize::sanitize_username;
use warden_core::identity::{AccountError, NewLocalAccount};

use crate::AppState;
use crate::handlers::auth::ADMIN_ROLE;

/// Create a local admin named `username` unless that identity exists.
///
/// Returns whether an account was created.
pub async fn ensure_admin(
    state: &AppState,
    username: &str,
    password: SecretString,
) -> Result<bool, AccountError> {
    let username = sanitize_username(username)
        .map_err(|e| AccountError::Validation(e.to_string()))?;
    if state.identities.exists_by_username(&username).await? {
        return Ok(false);
    }
    let email = format!(
        "{username}@{}",
        state.config.sync.placeholder_email_domain
    );
    state
        .accounts
        .register_local(NewLocalAccount {
            username: username.clone(),
            email,
            display_name: None,
            password,
            roles: vec![ADMIN_ROLE.to_string()],
        })
        .await?;
    Ok(true)
}
