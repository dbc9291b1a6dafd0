//! Traits for the upload pipeline seams.

use std::path::Path;

use async_trait::async_trait;

use rentiva_core::{UploadError, UploadedFileRecord};

/// Outcome of a malware scan. The adapter reports what the engine said; the
/// fail-open/fail-closed policy decision belongs to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    /// Threat label from the engine. Goes to logs and the quarantine reason,
    /// never to the client.
    Infected(String),
    Unavailable(String),
}

/// External malware scanning engine (e.g. ClamAV). Implementations must
/// complete or error within their configured timeout; they never hang the
/// pipeline.
#[async_trait]
pub trait VirusScanner: Send + Sync {
    async fn scan(&self, data: &[u8]) -> ScanVerdict;
}

/// Receives infected files from the pipeline. Implemented by the quarantine
/// service; moves bytes and records the ledger state in one operation.
#[async_trait]
pub trait QuarantineSink: Send + Sync {
    async fn quarantine_file(
        &self,
        source: &Path,
        record: &UploadedFileRecord,
        reason: &str,
    ) -> Result<(), UploadError>;
}
