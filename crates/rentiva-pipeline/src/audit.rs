//! Security event logging.
//!
//! Every rejection, quarantine transition, and rate-limit violation emits a
//! structured tracing event carrying a `security_event` tag and a severity
//! grade. Operator logs get full detail; nothing here reaches the client.

use uuid::Uuid;

use rentiva_core::{RejectionReason, Severity};

pub fn log_rejection(reason: &RejectionReason, original_filename: &str, owner_id: Uuid) {
    match reason.severity() {
        Severity::Critical | Severity::High => {
            tracing::error!(
                security_event = "upload_rejected",
                severity = %reason.severity(),
                reason = %reason,
                original_filename = %original_filename,
                owner_id = %owner_id,
                "Upload rejected"
            );
        }
        Severity::Medium => {
            tracing::warn!(
                security_event = "upload_rejected",
                severity = %reason.severity(),
                reason = %reason,
                original_filename = %original_filename,
                owner_id = %owner_id,
                "Upload rejected"
            );
        }
        Severity::Low => {
            tracing::info!(
                security_event = "upload_rejected",
                severity = %reason.severity(),
                reason = %reason,
                original_filename = %original_filename,
                owner_id = %owner_id,
                "Upload rejected"
            );
        }
    }
}

pub fn log_polyglot_detected(original_filename: &str, owner_id: Uuid, detected: &[&'static str]) {
    tracing::error!(
        security_event = "polyglot_detected",
        severity = %Severity::Critical,
        original_filename = %original_filename,
        owner_id = %owner_id,
        detected_types = ?detected,
        "Multiple format signatures in upload header"
    );
}

pub fn log_duplicate(content_hash: &str, existing_id: Uuid, owner_id: Uuid) {
    tracing::info!(
        security_event = "duplicate_upload",
        content_hash = %content_hash,
        existing_id = %existing_id,
        owner_id = %owner_id,
        "Duplicate content hash accepted (soft dedup)"
    );
}

pub fn log_quarantined(file_id: Uuid, reason: &str) {
    tracing::error!(
        security_event = "file_quarantined",
        severity = %Severity::Critical,
        file_id = %file_id,
        reason = %reason,
        "File moved to quarantine"
    );
}

pub fn log_released(file_id: Uuid) {
    tracing::warn!(
        security_event = "quarantine_released",
        file_id = %file_id,
        "File released from quarantine by admin"
    );
}

pub fn log_purged(file_id: Uuid) {
    tracing::warn!(
        security_event = "quarantine_purged",
        file_id = %file_id,
        "Quarantined file purged"
    );
}

pub fn log_rate_limit_exceeded(identity_id: Uuid, source_addr: &str) {
    tracing::warn!(
        security_event = "rate_limit_exceeded",
        severity = %Severity::Medium,
        identity_id = %identity_id,
        source_addr = %source_addr,
        "Upload rate limit exceeded"
    );
}

pub fn log_scanner_unavailable(detail: &str, fail_closed: bool) {
    tracing::warn!(
        security_event = "scanner_unavailable",
        fail_closed,
        detail = %detail,
        "Malware scanner unavailable"
    );
}
