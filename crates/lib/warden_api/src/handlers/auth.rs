//! Authentication request handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use secrecy::SecretString;
use serde::Deserialize;
use warden_core::auth::{LoginRequest, LoginSuccess};
use warden_core::identity::{IdentitySummary, NewLocalAccount};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedIdentity;
use crate::services::client_ip::ClientIp;

/// Role allowed to manage accounts and directory settings.
pub const ADMIN_ROLE: &str = "admin";

/// `POST /auth/login` body.
#[derive(Deserialize)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
    /// `standard`, `directory` (or `ldap`), or `auto`.
    #[serde(default)]
    pub mode: Option<String>,
}

/// `POST /auth/register` body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// `POST /auth/password` body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordBody {
    pub current_password: String,
    pub new_password: String,
}

/// `POST /auth/login`: authenticate with username + password.
pub async fn login_handler(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    Json(body): Json<LoginBody>,
) -> AppResult<Json<LoginSuccess>> {
    let request = LoginRequest {
        username: body.username,
        password: SecretString::from(body.password),
        mode: body.mode,
        client_ip,
    };
    let success = state.resolver.login(request).await?;
    Ok(Json(success))
}

/// `GET /auth/me`: the caller's identity.
pub async fn me_handler(
    Extension(caller): Extension<AuthenticatedIdentity>,
) -> Json<IdentitySummary> {
    Json(caller.0.summary())
}

/// `POST /auth/register`: create a local account. Admin only.
pub async fn register_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedIdentity>,
    Json(body): Json<RegisterBody>,
) -> AppResult<(StatusCode, Json<IdentitySummary>)> {
    caller.require_role(ADMIN_ROLE)?;
    let roles = if body.roles.is_empty() {
        vec![state.config.sync.default_role.clone()]
    } else {
        body.roles
    };
    let identity = state
        .accounts
        .register_local(NewLocalAccount {
            username: body.username,
            email: body.email,
            display_name: body.display_name,
            password: SecretString::from(body.password),
            roles,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(identity.summary())))
}

/// `POST /auth/password`: change the caller's local password.
pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedIdentity>,
    Json(body): Json<ChangePasswordBody>,
) -> AppResult<StatusCode> {
    state
        .accounts
        .change_password(
            &caller.0.username,
            &SecretString::from(body.current_password),
            &SecretString::from(body.new_password),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
