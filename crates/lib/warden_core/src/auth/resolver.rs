//! Login orchestration.
//!
//! Order of checks: input shape, IP rate limit, account lockout, then the
//! credential check selected by [`LoginMode`]. Every refusal past the input
//! check is recorded in the attempt ledger. All credential failures leave
//! through the same [`LoginError::AuthenticationFailed`]; the precise
//! reason only reaches the audit sink.

use std::str::FromStr;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, error, warn};

pub use super::audit::FailureReason;
use super::audit::{AuditSink, AuthEvent, AuthMethod};
use super::password::verify_password;
use super::token::TokenService;
use crate::attempts::AttemptLedger;
use crate::directory::sanitize::sanitize_username;
use crate::directory::{Directory, DirectoryOutcome, DirectorySettingsStore};
use crate::identity::{Identity, IdentityStore, IdentitySummary, IdentitySynchronizer};
use crate::redact::mask_sensitive;

/// Longest accepted login password in bytes.
///
/// Directory passwords may be this long. Local passwords are capped at
/// [`crate::identity::local::MAX_PASSWORD_BYTES`] when they are set.
pub const MAX_PASSWORD_LEN: usize = 1024;

/// Which credential sources a login may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginMode {
    /// Local password only.
    Standard,
    /// Directory only.
    Directory,
    /// Directory when enabled, local password otherwise or on failure.
    #[default]
    Auto,
}

impl LoginMode {
    /// Parse an optional mode; absent or empty means [`LoginMode::Auto`].
    pub fn parse(mode: Option<&str>) -> Result<Self, LoginError> {
        match mode.map(str::trim) {
            None | Some("") => Ok(LoginMode::Auto),
            Some(m) => m.parse(),
        }
    }
}

impl FromStr for LoginMode {
    type Err = LoginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(LoginMode::Auto),
            "standard" => Ok(LoginMode::Standard),
            "directory" | "ldap" => Ok(LoginMode::Directory),
            other => Err(LoginError::InvalidInput(format!("unknown login mode '{other}'"))),
        }
    }
}

/// A login request.
#[derive(Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: SecretString,
    pub mode: Option<String>,
    pub client_ip: String,
}

/// Outward error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RateLimitExceeded,
    AccountLocked,
    AuthenticationFailed,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::AccountLocked => "ACCOUNT_LOCKED",
            ErrorCode::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Login errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("Invalid login request: {0}")]
    InvalidInput(String),

    #[error("Too many login attempts, try again later")]
    RateLimited,

    #[error("Account temporarily locked, try again later")]
    AccountLocked,

    #[error("Invalid username or password")]
    AuthenticationFailed { remaining_attempts: Option<u32> },

    #[error("Internal error")]
    Internal(String),
}

impl LoginError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LoginError::InvalidInput(_) | LoginError::AuthenticationFailed { .. } => {
                ErrorCode::AuthenticationFailed
            }
            LoginError::RateLimited => ErrorCode::RateLimitExceeded,
            LoginError::AccountLocked => ErrorCode::AccountLocked,
            LoginError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

fn internal(e: impl std::fmt::Display) -> LoginError {
    let message = mask_sensitive(&e.to_string());
    error!("login aborted: {message}");
    LoginError::Internal(message)
}

/// A successful login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSuccess {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub identity: IdentitySummary,
}

/// Result of one credential source.
enum Check {
    Accepted(Identity, AuthMethod),
    Rejected(FailureReason),
}

/// Resolves a username/password pair to a session token.
pub struct CredentialResolver {
    ledger: AttemptLedger,
    identities: Arc<dyn IdentityStore>,
    synchronizer: Arc<IdentitySynchronizer>,
    directory: Arc<dyn Directory>,
    settings: Arc<dyn DirectorySettingsStore>,
    tokens: Arc<TokenService>,
    audit: Arc<dyn AuditSink>,
}

impl CredentialResolver {
    pub fn new(
        ledger: AttemptLedger,
        identities: Arc<dyn IdentityStore>,
        synchronizer: Arc<IdentitySynchronizer>,
        directory: Arc<dyn Directory>,
        settings: Arc<dyn DirectorySettingsStore>,
        tokens: Arc<TokenService>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            ledger,
            identities,
            synchronizer,
            directory,
            settings,
            tokens,
            audit,
        }
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginSuccess, LoginError> {
        let mode = LoginMode::parse(request.mode.as_deref())?;
        let username = sanitize_username(&request.username)
            .map_err(|e| LoginError::InvalidInput(e.to_string()))?;
        let password = request.password.expose_secret();
        if password.is_empty() {
            return Err(LoginError::InvalidInput("password is required".into()));
        }
        if password.len() > MAX_PASSWORD_LEN {
            return Err(LoginError::InvalidInput("password is too long".into()));
        }
        let ip = request.client_ip.as_str();

        if self.ledger.is_ip_blocked(ip).await.map_err(internal)? {
            self.ledger.record(&username, ip, false).await.map_err(internal)?;
            self.audit
                .record(&AuthEvent::RateLimited {
                    username: username.clone(),
                    ip: ip.to_string(),
                })
                .await;
            return Err(LoginError::RateLimited);
        }
        if self.ledger.is_account_locked(&username).await.map_err(internal)? {
            self.ledger.record(&username, ip, false).await.map_err(internal)?;
            self.audit
                .record(&AuthEvent::AccountLocked {
                    username: username.clone(),
                    ip: ip.to_string(),
                })
                .await;
            return Err(LoginError::AccountLocked);
        }

        let check = match mode {
            LoginMode::Standard => self.check_local(&username, password).await?,
            LoginMode::Directory => self.check_directory(&username, password).await?,
            LoginMode::Auto => match self.check_directory(&username, password).await? {
                Check::Rejected(reason) => {
                    debug!(%username, reason = reason.as_str(), "falling back to local credentials");
                    self.check_local(&username, password).await?
                }
                accepted => accepted,
            },
        };

        match check {
            Check::Accepted(identity, method) => self.succeed(identity, method, ip).await,
            Check::Rejected(reason) => Err(self.fail(&username, ip, reason).await?),
        }
    }

    async fn check_directory(&self, username: &str, password: &str) -> Result<Check, LoginError> {
        let Some(settings) = self.settings.active().await.map_err(internal)?.filter(|s| s.enabled)
        else {
            debug!(username, "directory disabled");
            return Ok(Check::Rejected(FailureReason::DirectoryUnavailable));
        };

        match self.directory.authenticate(username, password, &settings).await {
            DirectoryOutcome::Success { distinguished_name } => {
                let identity = self
                    .synchronizer
                    .sync_from_directory(username, Some(&distinguished_name))
                    .await
                    .map_err(internal)?;
                Ok(Check::Accepted(identity, AuthMethod::Directory))
            }
            DirectoryOutcome::BadCredentials => {
                debug!(username, "directory rejected credentials");
                Ok(Check::Rejected(FailureReason::DirectoryRejected))
            }
            DirectoryOutcome::TransportError(e) => {
                error!(username, "directory unavailable: {}", mask_sensitive(&e.to_string()));
                Ok(Check::Rejected(FailureReason::DirectoryUnavailable))
            }
        }
    }

    async fn check_local(&self, username: &str, password: &str) -> Result<Check, LoginError> {
        let Some(identity) = self
            .identities
            .find_by_username(username)
            .await
            .map_err(internal)?
        else {
            return Ok(Check::Rejected(FailureReason::UserNotFound));
        };
        if !identity.active {
            return Ok(Check::Rejected(FailureReason::Inactive));
        }
        let Some(hash) = identity.local_hash() else {
            return Ok(Check::Rejected(FailureReason::NoLocalCredential));
        };
        match verify_password(password, hash) {
            Ok(true) => Ok(Check::Accepted(identity, AuthMethod::Local)),
            Ok(false) => Ok(Check::Rejected(FailureReason::InvalidPassword)),
            Err(e) => {
                warn!(username, "stored password hash unreadable: {e}");
                Ok(Check::Rejected(FailureReason::InvalidPassword))
            }
        }
    }

    async fn succeed(
        &self,
        identity: Identity,
        method: AuthMethod,
        ip: &str,
    ) -> Result<LoginSuccess, LoginError> {
        self.ledger
            .record(&identity.username, ip, true)
            .await
            .map_err(internal)?;

        let mut claims = Map::new();
        claims.insert("roles".into(), json!(identity.roles));
        claims.insert("email".into(), Value::String(identity.email.clone()));
        let token = self
            .tokens
            .issue(&identity.username, claims)
            .map_err(internal)?;

        self.audit
            .record(&AuthEvent::LoginSucceeded {
                username: identity.username.clone(),
                ip: ip.to_string(),
                method,
            })
            .await;

        Ok(LoginSuccess {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.expires_in(),
            identity: identity.summary(),
        })
    }

    async fn fail(
        &self,
        username: &str,
        ip: &str,
        reason: FailureReason,
    ) -> Result<LoginError, LoginError> {
        self.ledger.record(username, ip, false).await.map_err(internal)?;
        self.audit
            .record(&AuthEvent::LoginFailed {
                username: username.to_string(),
                ip: ip.to_string(),
                reason,
            })
            .await;

        let remaining = self
            .ledger
            .remaining_attempts(username)
            .await
            .map_err(internal)?;
        let hint = (remaining < self.ledger.policy().max_failed).then_some(remaining);
        Ok(LoginError::AuthenticationFailed {
            remaining_attempts: hint,
        })
    }
}
