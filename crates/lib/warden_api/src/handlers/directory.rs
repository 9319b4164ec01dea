//! Directory administration: settings, connection checks, user search and
//! import. Every route needs the `admin` role.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use secrecy::SecretString;
use serde::Deserialize;
use warden_core::directory::settings::UpdateDirectorySettings;
use warden_core::identity::IdentitySummary;
use warden_core::models::directory::{ConnectionReport, DirectorySettingsView, DirectoryUser};

use super::auth::ADMIN_ROLE;
use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedIdentity;

/// `PUT /auth/directory-settings` body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsBody {
    pub urls: String,
    pub base: String,
    #[serde(default)]
    pub bind_username: Option<String>,
    /// Omit or send empty to keep the stored password.
    #[serde(default)]
    pub bind_password: Option<String>,
    #[serde(default)]
    pub user_search_base: Option<String>,
    #[serde(default)]
    pub user_search_filter: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl From<UpdateSettingsBody> for UpdateDirectorySettings {
    fn from(body: UpdateSettingsBody) -> Self {
        Self {
            urls: body.urls,
            base: body.base,
            bind_username: body.bind_username,
            bind_password: body.bind_password.map(SecretString::from),
            user_search_base: body.user_search_base,
            user_search_filter: body.user_search_filter,
            enabled: body.enabled,
        }
    }
}

/// `POST /auth/directory/search` body.
#[derive(Deserialize)]
pub struct SearchBody {
    pub username: String,
}

/// `POST /auth/directory/import` body.
#[derive(Deserialize)]
pub struct ImportBody {
    pub username: String,
    /// Empty keeps stored roles, or assigns the default role.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// `GET /auth/directory-settings`
pub async fn get_settings_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedIdentity>,
) -> AppResult<Json<DirectorySettingsView>> {
    caller.require_role(ADMIN_ROLE)?;
    Ok(Json(state.directory_settings.current().await?))
}

/// `PUT /auth/directory-settings`
pub async fn update_settings_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedIdentity>,
    Json(body): Json<UpdateSettingsBody>,
) -> AppResult<Json<DirectorySettingsView>> {
    caller.require_role(ADMIN_ROLE)?;
    let view = state.directory_settings.update(body.into()).await?;
    Ok(Json(view))
}

/// `POST /auth/directory-settings/test`: check submitted settings without
/// saving them.
pub async fn test_settings_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedIdentity>,
    Json(body): Json<UpdateSettingsBody>,
) -> AppResult<Json<ConnectionReport>> {
    caller.require_role(ADMIN_ROLE)?;
    let report = state.directory_admin.test_connection(Some(body.into())).await?;
    Ok(Json(report))
}

/// `POST /auth/directory-settings/test/saved`
pub async fn test_saved_settings_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedIdentity>,
) -> AppResult<Json<ConnectionReport>> {
    caller.require_role(ADMIN_ROLE)?;
    Ok(Json(state.directory_admin.test_connection(None).await?))
}

/// `POST /auth/directory/search`
pub async fn search_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedIdentity>,
    Json(body): Json<SearchBody>,
) -> AppResult<Json<Vec<DirectoryUser>>> {
    caller.require_role(ADMIN_ROLE)?;
    Ok(Json(state.directory_admin.search(&body.username).await?))
}

/// `POST /auth/directory/import`
pub async fn import_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedIdentity>,
    Json(body): Json<ImportBody>,
) -> AppResult<(StatusCode, Json<IdentitySummary>)> {
    caller.require_role(ADMIN_ROLE)?;
    let identity = state
        .directory_admin
        .import(&body.username, body.roles)
        .await?;
    Ok((StatusCode::CREATED, Json(identity.summary())))
}
