//! Quarantine lifecycle: ACTIVE → QUARANTINED → RELEASED | PURGED.
//!
//! Bytes exist in exactly one of normal or quarantine storage at any
//! instant: every transition is a single rename, never copy-then-delete.
//! Concurrent release/purge on the same file id are serialized with a
//! per-id lock. A background sweep purges entries past the retention
//! period.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::interval;
use uuid::Uuid;

use rentiva_core::{ScanStatus, UploadError, UploadLedger, UploadedFileRecord};
use rentiva_pipeline::audit;
use rentiva_pipeline::traits::QuarantineSink;
use rentiva_storage::LocalStore;

pub struct QuarantineService {
    active: Arc<LocalStore>,
    quarantine: LocalStore,
    ledger: Arc<dyn UploadLedger>,
    retention_days: i64,
    sweep_interval: Duration,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl QuarantineService {
    pub async fn new(
        active: Arc<LocalStore>,
        quarantine_root: impl Into<std::path::PathBuf>,
        ledger: Arc<dyn UploadLedger>,
        retention_days: i64,
        sweep_interval: Duration,
    ) -> Result<Self, UploadError> {
        let quarantine = LocalStore::new(quarantine_root)
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        Ok(Self {
            active,
            quarantine,
            ledger,
            retention_days,
            sweep_interval,
            locks: Mutex::new(HashMap::new()),
        })
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(unix)]
    async fn restrict_permissions(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
        {
            tracing::warn!(error = %e, path = %path.display(), "Failed to restrict quarantine permissions");
        }
    }

    #[cfg(not(unix))]
    async fn restrict_permissions(_path: &Path) {}

    /// Release a quarantined file back to normal storage. Returns false when
    /// the id is unknown or not quarantined.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, file_id: Uuid) -> Result<bool, UploadError> {
        let lock = self.lock_for(file_id).await;
        let _guard = lock.lock().await;

        let Some(record) = self.ledger.get(file_id).await? else {
            return Ok(false);
        };
        if !record.is_quarantined {
            return Ok(false);
        }

        let entry_name = record.quarantine_entry_name();
        let restored_path = self
            .quarantine
            .move_entry_to(&entry_name, &self.active, &record.stored_filename)
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = tokio::fs::set_permissions(
                &restored_path,
                std::fs::Permissions::from_mode(0o644),
            )
            .await
            {
                tracing::warn!(error = %e, "Failed to restore permissions on release");
            }
        }

        self.ledger
            .set_quarantine_state(file_id, false, ScanStatus::Clean)
            .await?;
        self.ledger
            .set_storage_location(
                file_id,
                &record.stored_filename,
                &restored_path.display().to_string(),
            )
            .await?;

        audit::log_released(file_id);
        Ok(true)
    }

    /// Permanently delete a quarantined file's bytes and ledger row. Returns
    /// false when the id is unknown or not quarantined.
    #[tracing::instrument(skip(self))]
    pub async fn purge(&self, file_id: Uuid) -> Result<bool, UploadError> {
        let lock = self.lock_for(file_id).await;
        let _guard = lock.lock().await;

        let Some(record) = self.ledger.get(file_id).await? else {
            return Ok(false);
        };
        if !record.is_quarantined {
            return Ok(false);
        }

        self.quarantine
            .delete(&record.quarantine_entry_name())
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;
        self.ledger.delete(file_id).await?;

        audit::log_purged(file_id);
        Ok(true)
    }

    /// Page through quarantined records; returns the page and the total
    /// quarantined count.
    pub async fn list_quarantined(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UploadedFileRecord>, i64), UploadError> {
        self.ledger.list_quarantined(limit, offset).await
    }

    /// Purge every quarantined entry older than the retention period.
    /// Returns the number purged.
    #[tracing::instrument(skip(self), fields(retention_days = self.retention_days))]
    pub async fn sweep_expired(&self) -> Result<usize, UploadError> {
        let cutoff = Utc::now() - chrono::Duration::days(self.retention_days);
        let expired = self.ledger.quarantined_older_than(cutoff).await?;
        let mut purged = 0;

        for record in expired {
            match self.purge(record.id).await {
                Ok(true) => purged += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        file_id = %record.id,
                        "Failed to purge expired quarantine entry"
                    );
                }
            }
        }

        if purged > 0 {
            tracing::info!(purged, "Quarantine retention sweep completed");
        }

        Ok(purged)
    }

    /// Start the background retention sweep.
    /// Returns a JoinHandle for graceful shutdown.
    pub fn start_sweep(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(self.sweep_interval);

            loop {
                sweep_interval.tick().await;

                if let Err(e) = self.sweep_expired().await {
                    tracing::error!(error = %e, "Quarantine sweep failed");
                }
            }
        })
    }
}

#[async_trait]
impl QuarantineSink for QuarantineService {
    /// Move a suspect file into the quarantine directory and persist its
    /// record with the quarantine flag set.
    async fn quarantine_file(
        &self,
        source: &Path,
        record: &UploadedFileRecord,
        reason: &str,
    ) -> Result<(), UploadError> {
        let entry_name = record.quarantine_entry_name();
        let dest = self
            .quarantine
            .adopt(&entry_name, source)
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        Self::restrict_permissions(&dest).await;

        let mut stored = record.clone();
        stored.is_quarantined = true;
        stored.storage_path = dest.display().to_string();
        self.ledger.insert(&stored).await?;

        audit::log_quarantined(record.id, reason);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rentiva_pipeline::test_helpers::MemoryLedger;
    use tempfile::tempdir;

    async fn setup(
        dir: &Path,
        retention_days: i64,
    ) -> (Arc<QuarantineService>, MemoryLedger, Arc<LocalStore>) {
        let active = Arc::new(LocalStore::new(dir.join("active")).await.unwrap());
        let ledger = MemoryLedger::new();
        let service = QuarantineService::new(
            active.clone(),
            dir.join("quarantine"),
            Arc::new(ledger.clone()),
            retention_days,
            Duration::from_secs(3600),
        )
        .await
        .unwrap();
        (Arc::new(service), ledger, active)
    }

    fn make_record(stored_filename: &str) -> UploadedFileRecord {
        UploadedFileRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            stored_filename: stored_filename.to_string(),
            original_filename: "photo.jpg".to_string(),
            content_hash: "ab".repeat(32),
            byte_size: 7,
            declared_mime_type: "image/jpeg".to_string(),
            storage_path: String::new(),
            is_quarantined: false,
            scan_status: ScanStatus::Infected,
            created_at: Utc::now(),
        }
    }

    async fn quarantine_fixture(
        dir: &Path,
        service: &QuarantineService,
    ) -> UploadedFileRecord {
        let record = make_record("f.jpg");
        let source = dir.join("incoming.tmp");
        tokio::fs::write(&source, b"payload").await.unwrap();
        service
            .quarantine_file(&source, &record, "Test-Threat")
            .await
            .unwrap();
        record
    }

    #[tokio::test]
    async fn quarantine_moves_bytes_and_flags_record() {
        let dir = tempdir().unwrap();
        let (service, ledger, active) = setup(dir.path(), 30).await;

        let record = quarantine_fixture(dir.path(), &service).await;

        let stored = ledger.get(record.id).await.unwrap().unwrap();
        assert!(stored.is_quarantined);
        assert_eq!(stored.scan_status, ScanStatus::Infected);
        assert!(stored.quarantine_state_consistent());

        // Bytes in quarantine, not in active storage.
        assert!(!active.exists("f.jpg").await.unwrap());
        assert!(service
            .quarantine
            .exists(&record.quarantine_entry_name())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn release_returns_bytes_to_active_storage() {
        let dir = tempdir().unwrap();
        let (service, ledger, active) = setup(dir.path(), 30).await;

        let record = quarantine_fixture(dir.path(), &service).await;

        assert!(service.release(record.id).await.unwrap());

        let stored = ledger.get(record.id).await.unwrap().unwrap();
        assert!(!stored.is_quarantined);
        assert_eq!(stored.scan_status, ScanStatus::Clean);

        assert!(active.exists("f.jpg").await.unwrap());
        assert!(!service
            .quarantine
            .exists(&record.quarantine_entry_name())
            .await
            .unwrap());
        assert_eq!(active.read("f.jpg").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn purge_removes_bytes_and_record() {
        let dir = tempdir().unwrap();
        let (service, ledger, active) = setup(dir.path(), 30).await;

        let record = quarantine_fixture(dir.path(), &service).await;

        assert!(service.purge(record.id).await.unwrap());

        assert!(ledger.get(record.id).await.unwrap().is_none());
        assert!(!active.exists("f.jpg").await.unwrap());
        assert!(!service
            .quarantine
            .exists(&record.quarantine_entry_name())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn release_of_unknown_id_returns_false() {
        let dir = tempdir().unwrap();
        let (service, _ledger, _active) = setup(dir.path(), 30).await;

        assert!(!service.release(Uuid::new_v4()).await.unwrap());
        assert!(!service.purge(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn double_release_is_idempotent() {
        let dir = tempdir().unwrap();
        let (service, _ledger, _active) = setup(dir.path(), 30).await;

        let record = quarantine_fixture(dir.path(), &service).await;

        assert!(service.release(record.id).await.unwrap());
        assert!(!service.release(record.id).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_release_and_purge_keep_single_location() {
        let dir = tempdir().unwrap();
        let (service, ledger, active) = setup(dir.path(), 30).await;

        let record = quarantine_fixture(dir.path(), &service).await;

        let (released, purged) = tokio::join!(
            service.release(record.id),
            service.purge(record.id)
        );
        let released = released.unwrap();
        let purged = purged.unwrap();

        // Serialized per id: exactly one operation wins.
        assert!(released ^ purged, "exactly one of release/purge must win");

        let in_active = active.exists("f.jpg").await.unwrap();
        let in_quarantine = service
            .quarantine
            .exists(&record.quarantine_entry_name())
            .await
            .unwrap();

        if released {
            assert!(in_active && !in_quarantine);
            assert!(ledger.get(record.id).await.unwrap().is_some());
        } else {
            assert!(!in_active && !in_quarantine);
            assert!(ledger.get(record.id).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn sweep_purges_only_expired_entries() {
        let dir = tempdir().unwrap();
        let (service, ledger, _active) = setup(dir.path(), 30).await;

        let old = quarantine_fixture(dir.path(), &service).await;
        // Backdate the old entry past the retention period.
        {
            let mut stored = ledger.get(old.id).await.unwrap().unwrap();
            stored.created_at = Utc::now() - ChronoDuration::days(31);
            ledger.insert(&stored).await.unwrap();
        }

        let fresh = make_record("g.jpg");
        let source = dir.path().join("fresh.tmp");
        tokio::fs::write(&source, b"fresh").await.unwrap();
        service
            .quarantine_file(&source, &fresh, "Other-Threat")
            .await
            .unwrap();

        let purged = service.sweep_expired().await.unwrap();
        assert_eq!(purged, 1);

        assert!(ledger.get(old.id).await.unwrap().is_none());
        assert!(ledger.get(fresh.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_quarantined_pages_and_counts() {
        let dir = tempdir().unwrap();
        let (service, _ledger, _active) = setup(dir.path(), 30).await;

        for i in 0..5 {
            let record = make_record(&format!("f{}.jpg", i));
            let source = dir.path().join(format!("in{}.tmp", i));
            tokio::fs::write(&source, b"data").await.unwrap();
            service
                .quarantine_file(&source, &record, "Threat")
                .await
                .unwrap();
        }

        let (page, total) = service.list_quarantined(2, 1).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(total, 5);
    }
}
