//! Login attempt database queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{AttemptStore, LoginAttempt};
use crate::store::StoreError;

/// Append a login attempt.
pub async fn insert_attempt(pool: &PgPool, attempt: &LoginAttempt) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO login_attempts (username, ip_address, attempt_time, success) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&attempt.username)
    .bind(&attempt.ip_address)
    .bind(attempt.attempted_at)
    .bind(attempt.success)
    .execute(pool)
    .await?;
    Ok(())
}

/// Count failed attempts from an IP after `since`.
pub async fn count_failed_by_ip_since(
    pool: &PgPool,
    ip_address: &str,
    since: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM login_attempts \
         WHERE ip_address = $1 AND attempt_time > $2 AND NOT success",
    )
    .bind(ip_address)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Count failed attempts for a username after `since`.
pub async fn count_failed_by_username_since(
    pool: &PgPool,
    username: &str,
    since: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM login_attempts \
         WHERE username = $1 AND attempt_time > $2 AND NOT success",
    )
    .bind(username)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Delete attempts older than `cutoff`.
pub async fn delete_attempts_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM login_attempts WHERE attempt_time < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// [`AttemptStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn insert(&self, attempt: &LoginAttempt) -> Result<(), StoreError> {
        insert_attempt(&self.pool, attempt).await
    }

    async fn count_failed_by_ip_since(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        count_failed_by_ip_since(&self.pool, ip_address, since).await
    }

    async fn count_failed_by_username_since(
        &self,
        username: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        count_failed_by_username_since(&self.pool, username, since).await
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        delete_attempts_before(&self.pool, cutoff).await
    }
}
