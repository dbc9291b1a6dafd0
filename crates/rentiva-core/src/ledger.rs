//! Upload ledger trait.
//!
//! The pipeline and quarantine service talk to the durable record store
//! through this trait so they can be tested without a database. The
//! Postgres implementation lives in `rentiva-db`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::UploadError;
use crate::models::{ScanStatus, UploadedFileRecord};

#[async_trait]
pub trait UploadLedger: Send + Sync {
    /// Persist a new record. Row-level atomicity is assumed; duplicate-hash
    /// races are tolerated because lookup is read-then-insert.
    async fn insert(&self, record: &UploadedFileRecord) -> Result<(), UploadError>;

    async fn get(&self, id: Uuid) -> Result<Option<UploadedFileRecord>, UploadError>;

    /// Duplicate lookup: oldest non-quarantined record with the same content
    /// hash, if any.
    async fn find_clean_by_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<UploadedFileRecord>, UploadError>;

    /// Flip the quarantine flag and scan status together so the
    /// `is_quarantined ⇒ scan_status` invariant is updated in one write.
    async fn set_quarantine_state(
        &self,
        id: Uuid,
        is_quarantined: bool,
        scan_status: ScanStatus,
    ) -> Result<(), UploadError>;

    /// Update the stored filename and storage path after a release moved the
    /// bytes back into normal storage.
    async fn set_storage_location(
        &self,
        id: Uuid,
        stored_filename: &str,
        storage_path: &str,
    ) -> Result<(), UploadError>;

    async fn delete(&self, id: Uuid) -> Result<(), UploadError>;

    /// Page of quarantined records plus the total quarantined count.
    async fn list_quarantined(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UploadedFileRecord>, i64), UploadError>;

    /// Quarantined records created before the cutoff; used by the retention
    /// sweep.
    async fn quarantined_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<UploadedFileRecord>, UploadError>;
}
