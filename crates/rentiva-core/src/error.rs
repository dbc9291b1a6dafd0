//! Error types module
//!
//! All failures in the upload pipeline are unified under [`UploadError`].
//! Client-facing rejections carry a typed [`RejectionReason`] whose
//! `client_message` never leaks threat detail or internal paths; full detail
//! goes to operator logs only.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Severity grade for security event logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Typed reason for rejecting an upload. Returned to callers; every variant
/// is also logged as a security event graded by [`RejectionReason::severity`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionReason {
    #[error("File extension not allowed: {0}")]
    ExtensionNotAllowed(String),

    #[error("Content type not allowed: {0}")]
    MimeNotAllowed(String),

    #[error("Content type {mime} does not match extension {extension}")]
    MimeExtensionMismatch { mime: String, extension: String },

    #[error("File signature does not match declared type")]
    SignatureMismatch,

    #[error("Multiple format signatures detected in file header")]
    PolyglotDetected,

    #[error("Image could not be decoded")]
    UnreadableImage,

    #[error("Image dimensions {width}x{height} outside allowed bounds")]
    DimensionsOutOfBounds { width: u32, height: u32 },

    #[error("Image pixel count {pixels} exceeds ceiling {ceiling}")]
    PixelCeilingExceeded { pixels: u64, ceiling: u64 },

    #[error("Decoded image format not allowed: {0}")]
    FormatNotAllowed(String),

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Empty file")]
    EmptyFile,

    #[error("Upload rate limit exceeded")]
    RateLimited,

    #[error("Malware detected")]
    MalwareDetected,

    #[error("Malware scanner unavailable")]
    ScannerUnavailable,
}

impl RejectionReason {
    /// Severity grade for the security event log. Polyglot and malware are
    /// critical; a forged signature is high; malformed input is low/medium.
    pub fn severity(&self) -> Severity {
        match self {
            RejectionReason::PolyglotDetected | RejectionReason::MalwareDetected => {
                Severity::Critical
            }
            RejectionReason::SignatureMismatch => Severity::High,
            RejectionReason::MimeExtensionMismatch { .. }
            | RejectionReason::ScannerUnavailable
            | RejectionReason::RateLimited => Severity::Medium,
            _ => Severity::Low,
        }
    }

    /// Client-facing message. Malware rejections deliberately carry no threat
    /// detail; the threat name goes only to operator logs and the quarantine
    /// reason.
    pub fn client_message(&self) -> String {
        match self {
            RejectionReason::MalwareDetected => {
                "File rejected by security policy".to_string()
            }
            RejectionReason::ScannerUnavailable => {
                "File could not be verified, please try again later".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload rejected: {0}")]
    Rejected(RejectionReason),

    #[error("Insufficient storage capacity: {available} bytes available, {required} bytes required")]
    InsufficientCapacity { available: u64, required: u64 },

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UploadError {
    /// True when the error is a client-facing rejection rather than an
    /// infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, UploadError::Rejected(_))
    }

    pub fn rejection_reason(&self) -> Option<&RejectionReason> {
        match self {
            UploadError::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    /// Message safe to return to the caller. Infrastructure failures are
    /// collapsed to a generic message; detail stays in operator logs.
    pub fn client_message(&self) -> String {
        match self {
            UploadError::Rejected(reason) => reason.client_message(),
            UploadError::InsufficientCapacity { .. } => {
                "Insufficient storage capacity".to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

impl From<RejectionReason> for UploadError {
    fn from(reason: RejectionReason) -> Self {
        UploadError::Rejected(reason)
    }
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for UploadError {
    fn from(err: SqlxError) -> Self {
        UploadError::Database(err)
    }
}

impl From<io::Error> for UploadError {
    fn from(err: io::Error) -> Self {
        UploadError::Internal(format!("IO error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polyglot_and_malware_are_critical() {
        assert_eq!(RejectionReason::PolyglotDetected.severity(), Severity::Critical);
        assert_eq!(RejectionReason::MalwareDetected.severity(), Severity::Critical);
    }

    #[test]
    fn signature_mismatch_is_high() {
        assert_eq!(RejectionReason::SignatureMismatch.severity(), Severity::High);
    }

    #[test]
    fn malformed_input_is_low() {
        assert_eq!(RejectionReason::EmptyFile.severity(), Severity::Low);
        assert_eq!(
            RejectionReason::FileTooLarge { size: 2, max: 1 }.severity(),
            Severity::Low
        );
    }

    #[test]
    fn malware_client_message_hides_threat_detail() {
        let msg = RejectionReason::MalwareDetected.client_message();
        assert!(!msg.to_lowercase().contains("malware"));
    }

    #[test]
    fn infrastructure_errors_collapse_to_generic_message() {
        let err = UploadError::Storage("disk exploded at /var/lib".to_string());
        assert_eq!(err.client_message(), "Internal server error");
        assert!(!err.is_rejection());
    }

    #[test]
    fn rejection_passes_reason_through() {
        let err = UploadError::from(RejectionReason::EmptyFile);
        assert!(err.is_rejection());
        assert_eq!(err.client_message(), "Empty file");
    }
}
