use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use rentiva_core::{ScanStatus, UploadError, UploadLedger, UploadedFileRecord};

/// Upload ledger repository.
///
/// Rows are written once at acceptance time and mutated only by the
/// quarantine lifecycle. All methods rely on per-row atomic writes; the
/// read-then-insert duplicate lookup is intentionally not serialized.
#[derive(Clone)]
pub struct UploadRepository {
    pool: PgPool,
}

impl UploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UploadLedger for UploadRepository {
    #[tracing::instrument(skip(self, record), fields(db.table = "uploads", db.operation = "insert", upload_id = %record.id))]
    async fn insert(&self, record: &UploadedFileRecord) -> Result<(), UploadError> {
        sqlx::query(
            r#"
            INSERT INTO uploads (
                id, owner_id, stored_filename, original_filename,
                content_hash, byte_size, declared_mime_type, storage_path,
                is_quarantined, scan_status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(record.owner_id)
        .bind(&record.stored_filename)
        .bind(&record.original_filename)
        .bind(&record.content_hash)
        .bind(record.byte_size)
        .bind(&record.declared_mime_type)
        .bind(&record.storage_path)
        .bind(record.is_quarantined)
        .bind(record.scan_status)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "select"))]
    async fn get(&self, id: Uuid) -> Result<Option<UploadedFileRecord>, UploadError> {
        let record = sqlx::query_as::<Postgres, UploadedFileRecord>(
            "SELECT * FROM uploads WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self, content_hash), fields(db.table = "uploads", db.operation = "select"))]
    async fn find_clean_by_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<UploadedFileRecord>, UploadError> {
        let record = sqlx::query_as::<Postgres, UploadedFileRecord>(
            r#"
            SELECT * FROM uploads
            WHERE content_hash = $1 AND is_quarantined = FALSE
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "update"))]
    async fn set_quarantine_state(
        &self,
        id: Uuid,
        is_quarantined: bool,
        scan_status: ScanStatus,
    ) -> Result<(), UploadError> {
        let result = sqlx::query(
            "UPDATE uploads SET is_quarantined = $2, scan_status = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(is_quarantined)
        .bind(scan_status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(UploadError::Internal(format!(
                "Upload record not found: {}",
                id
            )));
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, stored_filename, storage_path), fields(db.table = "uploads", db.operation = "update"))]
    async fn set_storage_location(
        &self,
        id: Uuid,
        stored_filename: &str,
        storage_path: &str,
    ) -> Result<(), UploadError> {
        sqlx::query(
            "UPDATE uploads SET stored_filename = $2, storage_path = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(stored_filename)
        .bind(storage_path)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "delete"))]
    async fn delete(&self, id: Uuid) -> Result<(), UploadError> {
        sqlx::query("DELETE FROM uploads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "select"))]
    async fn list_quarantined(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UploadedFileRecord>, i64), UploadError> {
        let records = sqlx::query_as::<Postgres, UploadedFileRecord>(
            r#"
            SELECT * FROM uploads
            WHERE is_quarantined = TRUE
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM uploads WHERE is_quarantined = TRUE")
                .fetch_one(&self.pool)
                .await?;

        Ok((records, total))
    }

    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "select"))]
    async fn quarantined_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<UploadedFileRecord>, UploadError> {
        let records = sqlx::query_as::<Postgres, UploadedFileRecord>(
            "SELECT * FROM uploads WHERE is_quarantined = TRUE AND created_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
