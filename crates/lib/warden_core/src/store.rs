//! Persistence error shared by the identity, attempt, and settings stores.

use thiserror::Error;

/// Postgres `unique_violation` SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Db(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e
            && db.code().as_deref() == Some(UNIQUE_VIOLATION)
        {
            return StoreError::Conflict(db.constraint().unwrap_or("unknown").to_string());
        }
        StoreError::Db(e)
    }
}
