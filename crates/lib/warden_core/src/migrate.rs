//! Schema migrations for identities, login attempts and directory settings.
//!
//! The SQL lives in `warden_core/migrations/` and is embedded at build time.

use sqlx::PgPool;
use tracing::debug;

/// Apply every pending migration.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    let migrator = sqlx::migrate!("./migrations");
    debug!(count = migrator.iter().count(), "applying embedded migrations");
    migrator.run(pool).await
}
