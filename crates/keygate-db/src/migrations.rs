//! Database migration management.
//!
//! Migrations are embedded at compile time from the `migrations/`
//! directory and applied in filename order.

use sqlx::migrate::MigrateError;
use sqlx::PgPool;

/// Run all pending database migrations.
///
/// # Errors
///
/// Returns the underlying [`MigrateError`] if any migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Migrations completed");
    Ok(())
}
