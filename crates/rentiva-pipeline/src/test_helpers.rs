//! In-memory implementations of the pipeline seams for testing.
//!
//! These allow exercising the orchestrator and the quarantine lifecycle
//! without a database or a running scanner daemon.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use rentiva_core::{ScanStatus, UploadError, UploadLedger, UploadedFileRecord};

use crate::traits::{QuarantineSink, ScanVerdict, VirusScanner};

/// Ledger backed by a HashMap.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    records: Arc<Mutex<HashMap<Uuid, UploadedFileRecord>>>,
    fail_inserts: Arc<Mutex<bool>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent inserts fail, to exercise the best-effort ledger
    /// write path.
    pub fn set_fail_inserts(&self, fail: bool) {
        *self.fail_inserts.lock().unwrap() = fail;
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<UploadedFileRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl UploadLedger for MemoryLedger {
    async fn insert(&self, record: &UploadedFileRecord) -> Result<(), UploadError> {
        if *self.fail_inserts.lock().unwrap() {
            return Err(UploadError::Internal("ledger unavailable".to_string()));
        }
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<UploadedFileRecord>, UploadError> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn find_clean_by_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<UploadedFileRecord>, UploadError> {
        let records = self.records.lock().unwrap();
        let mut matches: Vec<_> = records
            .values()
            .filter(|r| r.content_hash == content_hash && !r.is_quarantined)
            .collect();
        matches.sort_by_key(|r| r.created_at);
        Ok(matches.first().map(|r| (*r).clone()))
    }

    async fn set_quarantine_state(
        &self,
        id: Uuid,
        is_quarantined: bool,
        scan_status: ScanStatus,
    ) -> Result<(), UploadError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| UploadError::Internal(format!("Upload record not found: {}", id)))?;
        record.is_quarantined = is_quarantined;
        record.scan_status = scan_status;
        Ok(())
    }

    async fn set_storage_location(
        &self,
        id: Uuid,
        stored_filename: &str,
        storage_path: &str,
    ) -> Result<(), UploadError> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(&id) {
            record.stored_filename = stored_filename.to_string();
            record.storage_path = storage_path.to_string();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), UploadError> {
        self.records.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn list_quarantined(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UploadedFileRecord>, i64), UploadError> {
        let records = self.records.lock().unwrap();
        let mut quarantined: Vec<_> = records
            .values()
            .filter(|r| r.is_quarantined)
            .cloned()
            .collect();
        quarantined.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = quarantined.len() as i64;
        let page = quarantined
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn quarantined_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<UploadedFileRecord>, UploadError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .filter(|r| r.is_quarantined && r.created_at < cutoff)
            .cloned()
            .collect())
    }
}

/// Scanner returning a preset verdict.
pub struct MockScanner {
    verdict: Mutex<ScanVerdict>,
}

impl MockScanner {
    pub fn new(verdict: ScanVerdict) -> Self {
        Self {
            verdict: Mutex::new(verdict),
        }
    }

    pub fn set_verdict(&self, verdict: ScanVerdict) {
        *self.verdict.lock().unwrap() = verdict;
    }
}

#[async_trait]
impl VirusScanner for MockScanner {
    async fn scan(&self, _data: &[u8]) -> ScanVerdict {
        self.verdict.lock().unwrap().clone()
    }
}

/// Quarantine sink that moves files into a directory and records them in the
/// ledger, mirroring the real service's contract.
pub struct MemoryQuarantine {
    dir: PathBuf,
    ledger: MemoryLedger,
    reasons: Mutex<HashMap<Uuid, String>>,
}

impl MemoryQuarantine {
    pub fn new(dir: impl Into<PathBuf>, ledger: MemoryLedger) -> Self {
        Self {
            dir: dir.into(),
            ledger,
            reasons: Mutex::new(HashMap::new()),
        }
    }

    pub fn reason_for(&self, id: Uuid) -> Option<String> {
        self.reasons.lock().unwrap().get(&id).cloned()
    }

    pub fn entry_path(&self, record: &UploadedFileRecord) -> PathBuf {
        self.dir.join(record.quarantine_entry_name())
    }
}

#[async_trait]
impl QuarantineSink for MemoryQuarantine {
    async fn quarantine_file(
        &self,
        source: &Path,
        record: &UploadedFileRecord,
        reason: &str,
    ) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let dest = self.dir.join(record.quarantine_entry_name());
        tokio::fs::rename(source, &dest).await?;

        let mut stored = record.clone();
        stored.storage_path = dest.display().to_string();
        stored.is_quarantined = true;
        self.ledger.insert(&stored).await?;

        self.reasons
            .lock()
            .unwrap()
            .insert(record.id, reason.to_string());
        Ok(())
    }
}
