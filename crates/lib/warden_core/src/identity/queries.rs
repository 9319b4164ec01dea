//! Identity database queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{Identity, IdentityStore};
use crate::store::StoreError;

type IdentityRow = (
    Uuid,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    bool,
    Vec<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const COLUMNS: &str = "id, username, email, display_name, directory_dn, password_hash, \
     is_active, roles, created_at, updated_at";

fn from_row(row: IdentityRow) -> Identity {
    let (
        id,
        username,
        email,
        display_name,
        directory_dn,
        password_hash,
        active,
        roles,
        created_at,
        updated_at,
    ) = row;
    Identity {
        id,
        username,
        email,
        display_name,
        directory_dn,
        password_hash,
        active,
        roles,
        created_at,
        updated_at,
    }
}

/// Fetch an identity by username.
pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<Identity>, StoreError> {
    let row = sqlx::query_as::<_, IdentityRow>(&format!(
        "SELECT {COLUMNS} FROM identities WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(from_row))
}

/// Fetch the identity linked to a directory DN, ignoring case.
pub async fn find_by_directory_dn(
    pool: &PgPool,
    distinguished_name: &str,
) -> Result<Option<Identity>, StoreError> {
    let row = sqlx::query_as::<_, IdentityRow>(&format!(
        "SELECT {COLUMNS} FROM identities WHERE lower(directory_dn) = lower($1) \
         ORDER BY updated_at DESC LIMIT 1"
    ))
    .bind(distinguished_name)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(from_row))
}

/// Check whether a username is taken.
pub async fn username_exists(pool: &PgPool, username: &str) -> Result<bool, StoreError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM identities WHERE username = $1)",
    )
    .bind(username)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Check whether an email is taken.
pub async fn email_exists(pool: &PgPool, email: &str) -> Result<bool, StoreError> {
    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM identities WHERE email = $1)")
            .bind(email)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

/// Insert or update an identity keyed by id.
///
/// Unique violations on username/email surface as [`StoreError::Conflict`].
pub async fn upsert_identity(pool: &PgPool, identity: &Identity) -> Result<Identity, StoreError> {
    let row = sqlx::query_as::<_, IdentityRow>(&format!(
        "INSERT INTO identities \
           (id, username, email, display_name, directory_dn, password_hash, \
            is_active, roles, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (id) DO UPDATE SET \
           username = EXCLUDED.username, \
           email = EXCLUDED.email, \
           display_name = EXCLUDED.display_name, \
           directory_dn = EXCLUDED.directory_dn, \
           password_hash = EXCLUDED.password_hash, \
           is_active = EXCLUDED.is_active, \
           roles = EXCLUDED.roles, \
           updated_at = EXCLUDED.updated_at \
         RETURNING {COLUMNS}"
    ))
    .bind(identity.id)
    .bind(&identity.username)
    .bind(&identity.email)
    .bind(&identity.display_name)
    .bind(&identity.directory_dn)
    .bind(&identity.password_hash)
    .bind(identity.active)
    .bind(&identity.roles)
    .bind(identity.created_at)
    .bind(identity.updated_at)
    .fetch_one(pool)
    .await?;
    Ok(from_row(row))
}

/// [`IdentityStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        find_by_username(&self.pool, username).await
    }

    async fn find_by_directory_dn(
        &self,
        distinguished_name: &str,
    ) -> Result<Option<Identity>, StoreError> {
        find_by_directory_dn(&self.pool, distinguished_name).await
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        username_exists(&self.pool, username).await
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        email_exists(&self.pool, email).await
    }

    async fn save(&self, identity: &Identity) -> Result<Identity, StoreError> {
        upsert_identity(&self.pool, identity).await
    }
}
