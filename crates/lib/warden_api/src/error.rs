//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use warden_core::auth::{ErrorCode, LoginError, TokenError};
use warden_core::directory::DirectoryError;
use warden_core::directory::admin::DirectoryAdminError;
use warden_core::directory::settings::SettingsError;
use warden_core::identity::{AccountError, ImportError};
use warden_core::redact::mask_sensitive;
use warden_core::store::StoreError;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Generic error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Body of a refused login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
}

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Login(#[from] LoginError),

    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

fn login_status(e: &LoginError) -> StatusCode {
    match e {
        LoginError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        LoginError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        LoginError::AccountLocked => StatusCode::LOCKED,
        LoginError::AuthenticationFailed { .. } => StatusCode::UNAUTHORIZED,
        LoginError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn login_response(e: &LoginError) -> Response {
    let remaining_attempts = match e {
        LoginError::AuthenticationFailed { remaining_attempts } => *remaining_attempts,
        _ => None,
    };
    let body = Json(LoginErrorResponse {
        code: e.code(),
        message: e.to_string(),
        remaining_attempts,
    });
    (login_status(e), body).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Login(e) => return login_response(e),
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::DirectoryUnavailable(m) => {
                (StatusCode::BAD_GATEWAY, "directory_unavailable", m.as_str())
            }
            AppError::Internal(detail) => {
                error!("request failed: {}", mask_sensitive(detail));
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Signing(msg) => AppError::Internal(msg),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<AccountError> for AppError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Validation(msg) => AppError::Validation(msg),
            AccountError::UsernameTaken | AccountError::EmailTaken => {
                AppError::Conflict(e.to_string())
            }
            AccountError::NotFound => AppError::NotFound(e.to_string()),
            AccountError::NoLocalCredential => AppError::Validation(e.to_string()),
            AccountError::InvalidCredentials => AppError::Unauthorized(e.to_string()),
            AccountError::Password(inner) => AppError::Internal(inner.to_string()),
            AccountError::Store(inner) => AppError::from(inner),
        }
    }
}

impl From<SettingsError> for AppError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Validation(msg) => AppError::Validation(msg),
            SettingsError::Codec(inner) => AppError::Internal(inner.to_string()),
            SettingsError::Store(inner) => AppError::from(inner),
        }
    }
}

impl From<DirectoryAdminError> for AppError {
    fn from(e: DirectoryAdminError) -> Self {
        match e {
            DirectoryAdminError::Disabled => AppError::Conflict(e.to_string()),
            DirectoryAdminError::NotConfigured | DirectoryAdminError::UnknownUser(_) => {
                AppError::NotFound(e.to_string())
            }
            DirectoryAdminError::Directory(DirectoryError::InvalidUsername(msg)) => {
                AppError::Validation(msg)
            }
            DirectoryAdminError::Directory(inner) => AppError::DirectoryUnavailable(inner.to_string()),
            DirectoryAdminError::Import(ImportError::Store(StoreError::Conflict(_)))
            | DirectoryAdminError::Import(
                ImportError::UsernameActive(_) | ImportError::DistinguishedNameActive(_),
            ) => AppError::Conflict(e.to_string()),
            DirectoryAdminError::Import(ImportError::Store(inner))
            | DirectoryAdminError::Store(inner) => AppError::from(inner),
            DirectoryAdminError::Settings(inner) => AppError::from(inner),
        }
    }
}
