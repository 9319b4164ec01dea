//! Authentication middleware: Bearer token extraction and verification.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use warden_core::identity::Identity;

use crate::AppState;
use crate::error::AppError;

/// The identity behind a verified bearer token, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity(pub Identity);

impl AuthenticatedIdentity {
    pub fn has_role(&self, role: &str) -> bool {
        self.0.roles.iter().any(|r| r == role)
    }

    /// Fail with 403 unless the identity carries `role`.
    pub fn require_role(&self, role: &str) -> Result<(), AppError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("{role} role required")))
        }
    }
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies it,
/// loads the subject, and injects [`AuthenticatedIdentity`].
///
/// Tokens of deleted or deactivated identities are refused even before
/// they expire.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;

    let verified = state.tokens.verify(token).map_err(|e| {
        debug!("bearer token refused: {e}");
        AppError::Unauthorized("Invalid or expired token".into())
    })?;

    let identity = state
        .identities
        .find_by_username(&verified.subject)
        .await?
        .filter(|i| i.active)
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".into()))?;

    request
        .extensions_mut()
        .insert(AuthenticatedIdentity(identity));

    Ok(next.run(request).await)
}
