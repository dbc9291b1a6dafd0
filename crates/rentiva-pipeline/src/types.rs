//! Types for the upload pipeline.

use std::path::PathBuf;

use uuid::Uuid;

use rentiva_core::UploadedFileRecord;

/// A freshly-received file handed over by the transport layer: bytes already
/// written to a temp path, plus the caller's claims about them.
#[derive(Clone, Debug)]
pub struct IncomingFile {
    pub temp_path: PathBuf,
    pub declared_mime: String,
    pub original_filename: String,
    pub byte_size: u64,
}

/// Result of a fully accepted file.
#[derive(Clone, Debug)]
pub struct FinalizedFile {
    pub record: UploadedFileRecord,
    /// Id of an earlier accepted upload with the same content hash, if any.
    /// Duplicates are logged, never blocked.
    pub duplicate_of: Option<Uuid>,
}
