//! Postgres implementation of the upload ledger.

mod uploads;

pub use uploads::UploadRepository;

/// Run pending migrations for the uploads schema.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
