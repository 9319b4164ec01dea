//! Directory settings database queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{DirectorySettings, DirectorySettingsStore};
use crate::store::StoreError;

type SettingsRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    DateTime<Utc>,
    DateTime<Utc>,
);

const COLUMNS: &str = "id, urls, base, bind_username, bind_password_encrypted, \
     user_search_base, user_search_filter, is_enabled, created_at, updated_at";

fn from_row(row: SettingsRow) -> DirectorySettings {
    let (
        id,
        urls,
        base,
        bind_username,
        bind_password_encrypted,
        user_search_base,
        user_search_filter,
        enabled,
        created_at,
        updated_at,
    ) = row;
    DirectorySettings {
        id,
        urls,
        base,
        bind_username,
        bind_password_encrypted,
        user_search_base,
        user_search_filter,
        enabled,
        created_at,
        updated_at,
    }
}

/// Fetch the enabled configuration.
pub async fn find_active(pool: &PgPool) -> Result<Option<DirectorySettings>, StoreError> {
    let row = sqlx::query_as::<_, SettingsRow>(&format!(
        "SELECT {COLUMNS} FROM directory_settings WHERE is_enabled LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row.map(from_row))
}

/// Fetch the most recently updated configuration.
pub async fn find_latest(pool: &PgPool) -> Result<Option<DirectorySettings>, StoreError> {
    let row = sqlx::query_as::<_, SettingsRow>(&format!(
        "SELECT {COLUMNS} FROM directory_settings ORDER BY updated_at DESC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row.map(from_row))
}

/// Insert or update a configuration, keeping at most one row enabled.
pub async fn save_settings(
    pool: &PgPool,
    settings: &DirectorySettings,
) -> Result<DirectorySettings, StoreError> {
    let mut tx = pool.begin().await?;

    if settings.enabled {
        sqlx::query("UPDATE directory_settings SET is_enabled = FALSE WHERE is_enabled AND id <> $1")
            .bind(settings.id)
            .execute(&mut *tx)
            .await?;
    }

    let row = if settings.id == 0 {
        sqlx::query_as::<_, SettingsRow>(&format!(
            "INSERT INTO directory_settings \
               (urls, base, bind_username, bind_password_encrypted, \
                user_search_base, user_search_filter, is_enabled) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        ))
        .bind(&settings.urls)
        .bind(&settings.base)
        .bind(&settings.bind_username)
        .bind(&settings.bind_password_encrypted)
        .bind(&settings.user_search_base)
        .bind(&settings.user_search_filter)
        .bind(settings.enabled)
        .fetch_one(&mut *tx)
        .await?
    } else {
        sqlx::query_as::<_, SettingsRow>(&format!(
            "UPDATE directory_settings SET \
               urls = $2, base = $3, bind_username = $4, bind_password_encrypted = $5, \
               user_search_base = $6, user_search_filter = $7, is_enabled = $8, \
               updated_at = now() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        ))
        .bind(settings.id)
        .bind(&settings.urls)
        .bind(&settings.base)
        .bind(&settings.bind_username)
        .bind(&settings.bind_password_encrypted)
        .bind(&settings.user_search_base)
        .bind(&settings.user_search_filter)
        .bind(settings.enabled)
        .fetch_one(&mut *tx)
        .await?
    };

    tx.commit().await?;
    Ok(from_row(row))
}

/// [`DirectorySettingsStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgDirectorySettingsStore {
    pool: PgPool,
}

impl PgDirectorySettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectorySettingsStore for PgDirectorySettingsStore {
    async fn active(&self) -> Result<Option<DirectorySettings>, StoreError> {
        find_active(&self.pool).await
    }

    async fn latest(&self) -> Result<Option<DirectorySettings>, StoreError> {
        find_latest(&self.pool).await
    }

    async fn save(&self, settings: &DirectorySettings) -> Result<DirectorySettings, StoreError> {
        save_settings(&self.pool, settings).await
    }
}
