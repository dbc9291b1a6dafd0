//! Pipeline orchestrator: the fixed stage order for every uploaded file.
//!
//! Files are processed strictly sequentially so a mid-pipeline failure on
//! one file can never leave another half-sanitized. Each stage returns
//! either a transformed context or a terminal typed rejection; the first
//! rejection deletes the offending temp bytes plus any unprocessed ones and
//! short-circuits the batch.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use rentiva_core::{
    CapacityChecker, Identity, RejectionReason, ScanStatus, UploadError, UploadLedger,
    UploadSecurityConfig, UploadedFileRecord,
};
use rentiva_storage::LocalStore;

use crate::audit;
use crate::hasher;
use crate::polyglot;
use crate::sanitizer::{Sanitizer, CANONICAL_EXTENSION};
use crate::signature;
use crate::traits::{QuarantineSink, ScanVerdict, VirusScanner};
use crate::types::{FinalizedFile, IncomingFile};
use crate::validator::{ImageContentValidator, MediaValidator};

fn sanitize_filename(filename: &str) -> String {
    const MAX: usize = 255;
    let path = Path::new(filename);
    let base = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    if base.contains("..") {
        return "invalid_filename".to_string();
    }
    let s: String = base
        .chars()
        .take(MAX)
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.trim().is_empty() || s.len() < 3 {
        "file".to_string()
    } else {
        s
    }
}

/// Sequences every security stage for incoming uploads.
pub struct UploadPipeline {
    config: UploadSecurityConfig,
    store: Arc<LocalStore>,
    ledger: Arc<dyn UploadLedger>,
    quarantine: Arc<dyn QuarantineSink>,
    scanner: Option<Arc<dyn VirusScanner>>,
    validator: MediaValidator,
    capacity: CapacityChecker,
}

impl UploadPipeline {
    pub fn new(
        config: UploadSecurityConfig,
        store: Arc<LocalStore>,
        ledger: Arc<dyn UploadLedger>,
        quarantine: Arc<dyn QuarantineSink>,
        scanner: Option<Arc<dyn VirusScanner>>,
    ) -> Self {
        let validator = MediaValidator::new(
            config.max_file_size_bytes,
            config.allowed_extensions.clone(),
            config.allowed_content_types.clone(),
        );
        let capacity = CapacityChecker::new(config.min_disk_free_mb);

        Self {
            config,
            store,
            ledger,
            quarantine,
            scanner,
            validator,
            capacity,
        }
    }

    /// The single entry point callers use. Processes files sequentially; any
    /// stage failure cleans up all remaining temp bytes and returns the
    /// typed rejection; no partial acceptance of the failing file.
    #[tracing::instrument(skip(self, files), fields(file_count = files.len(), owner_id = %identity.id))]
    pub async fn validate_and_ingest(
        &self,
        files: Vec<IncomingFile>,
        identity: &Identity,
    ) -> Result<Vec<FinalizedFile>, UploadError> {
        let required: u64 = files.iter().map(|f| f.byte_size).sum();
        if let Err(err) = self
            .capacity
            .check_disk_space_async(self.store.root(), required)
            .await
        {
            for file in &files {
                Self::remove_temp(&file.temp_path).await;
            }
            return Err(err);
        }

        let mut accepted = Vec::with_capacity(files.len());
        let mut iter = files.into_iter();
        while let Some(file) = iter.next() {
            match self.process_one(&file, identity).await {
                Ok(finalized) => accepted.push(finalized),
                Err(err) => {
                    if let Some(reason) = err.rejection_reason() {
                        audit::log_rejection(reason, &file.original_filename, identity.id);
                    } else {
                        tracing::error!(
                            error = %err,
                            original_filename = %file.original_filename,
                            "Upload failed with infrastructure error"
                        );
                    }
                    Self::remove_temp(&file.temp_path).await;
                    for rest in iter.by_ref() {
                        Self::remove_temp(&rest.temp_path).await;
                    }
                    return Err(err);
                }
            }
        }

        Ok(accepted)
    }

    async fn process_one(
        &self,
        file: &IncomingFile,
        identity: &Identity,
    ) -> Result<FinalizedFile, UploadError> {
        // Stage 1: declared-type whitelist. Cheap string checks before any
        // bytes are read.
        let mut extension =
            self.validator
                .validate_all(&file.original_filename, &file.declared_mime, file.byte_size)?;

        let mut data = tokio::fs::read(&file.temp_path).await.map_err(|e| {
            UploadError::Storage(format!(
                "Failed to read temp file {}: {}",
                file.temp_path.display(),
                e
            ))
        })?;

        // The transport's claimed size can differ from what landed on disk.
        self.validator.validate_file_size(data.len() as u64)?;

        // Stage 2: magic bytes must match the declared extension.
        signature::verify_signature(&extension, &data)?;

        // Stage 3: polyglot detection over the header window.
        let detected = polyglot::detect_types(&data);
        if polyglot::is_polyglot(&detected) {
            let tags: Vec<&'static str> = detected.iter().map(|t| t.as_str()).collect();
            audit::log_polyglot_detected(&file.original_filename, identity.id, &tags);
            return Err(RejectionReason::PolyglotDetected.into());
        }

        // Stage 4: full decode. CPU-bound, so off the async pool.
        let content_validator = ImageContentValidator::new(
            self.config.min_dimension,
            self.config.max_dimension,
            self.config.max_pixels,
        );
        let decode_input = data.clone();
        let info =
            tokio::task::spawn_blocking(move || content_validator.validate(&decode_input))
                .await
                .map_err(|e| UploadError::Internal(format!("decode task failed: {}", e)))??;

        // Stage 5: re-encode through the trusted encoder. Failure is logged
        // and the validated-but-unsanitized file continues; sanitization is
        // defense in depth, not a gate.
        let quality = self.config.sanitizer_quality;
        let sanitize_input = data.clone();
        match tokio::task::spawn_blocking(move || Sanitizer::new(quality).reencode(&sanitize_input))
            .await
        {
            Ok(Ok(sanitized)) => {
                tokio::fs::write(&file.temp_path, &sanitized)
                    .await
                    .map_err(|e| {
                        UploadError::Storage(format!("Failed to replace sanitized bytes: {}", e))
                    })?;
                data = sanitized;
                extension = CANONICAL_EXTENSION.to_string();
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    error = %e,
                    original_filename = %file.original_filename,
                    "Sanitization failed, continuing with validated file"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sanitization task failed, continuing with validated file");
            }
        }

        // Stage 6: content hash of the final bytes.
        let content_hash = hasher::content_hash(&data);

        // Stage 7: soft dedup. A hit is logged, both copies are kept.
        let duplicate_of = match self.ledger.find_clean_by_hash(&content_hash).await {
            Ok(Some(existing)) => {
                audit::log_duplicate(&content_hash, existing.id, identity.id);
                Some(existing.id)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!(error = %e, "Duplicate lookup failed, continuing");
                None
            }
        };

        let file_id = Uuid::new_v4();
        let stored_filename = format!("{}.{}", file_id, extension);

        // Stage 8: malware scan, when an engine is configured.
        let mut scan_status = ScanStatus::Pending;
        if let Some(scanner) = &self.scanner {
            match scanner.scan(&data).await {
                ScanVerdict::Clean => scan_status = ScanStatus::Clean,
                ScanVerdict::Infected(threat) => {
                    let record = UploadedFileRecord {
                        id: file_id,
                        owner_id: identity.id,
                        stored_filename,
                        original_filename: sanitize_filename(&file.original_filename),
                        content_hash,
                        byte_size: data.len() as i64,
                        declared_mime_type: file.declared_mime.to_lowercase(),
                        storage_path: file.temp_path.display().to_string(),
                        is_quarantined: true,
                        scan_status: ScanStatus::Infected,
                        created_at: Utc::now(),
                    };
                    self.quarantine
                        .quarantine_file(&file.temp_path, &record, &threat)
                        .await?;
                    return Err(RejectionReason::MalwareDetected.into());
                }
                ScanVerdict::Unavailable(detail) => {
                    audit::log_scanner_unavailable(&detail, self.config.scan_fail_closed);
                    if self.config.scan_fail_closed {
                        return Err(RejectionReason::ScannerUnavailable.into());
                    }
                    scan_status = ScanStatus::Pending;
                }
            }
        }

        // Stage 9: move the bytes into normal storage and record the upload.
        let final_path = self
            .store
            .adopt(&stored_filename, &file.temp_path)
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        let record = UploadedFileRecord {
            id: file_id,
            owner_id: identity.id,
            stored_filename,
            original_filename: sanitize_filename(&file.original_filename),
            content_hash,
            byte_size: data.len() as i64,
            declared_mime_type: file.declared_mime.to_lowercase(),
            storage_path: final_path.display().to_string(),
            is_quarantined: false,
            scan_status,
            created_at: Utc::now(),
        };

        if let Err(e) = self.ledger.insert(&record).await {
            // The bytes are already safely sanitized on disk; the ledger is
            // bookkeeping, not the safety gate.
            tracing::error!(
                error = %e,
                upload_id = %record.id,
                "Ledger write failed after acceptance"
            );
        }

        tracing::info!(
            upload_id = %record.id,
            owner_id = %identity.id,
            width = info.width,
            height = info.height,
            byte_size = record.byte_size,
            scan_status = %record.scan_status,
            "Upload accepted"
        );

        Ok(FinalizedFile {
            record,
            duplicate_of,
        })
    }

    async fn remove_temp(path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    error = %e,
                    path = %path.display(),
                    "Failed to remove temp file"
                );
            }
        }
    }
}
