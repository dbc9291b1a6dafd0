use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of the malware scan for an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "scan_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Not yet scanned (scanner disabled, or fail-open while unavailable).
    Pending,
    Clean,
    Infected,
    /// The scan itself failed; the file may be quarantined pending review.
    Error,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Clean => "clean",
            ScanStatus::Infected => "infected",
            ScanStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of an authenticated caller. Issued by the external auth layer; the
/// pipeline only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Host,
    Admin,
}

/// Already-authenticated caller identity supplied by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

/// Durable ledger record for one uploaded file.
///
/// Invariants maintained by the pipeline and quarantine service:
/// - `is_quarantined` implies `scan_status` is infected, error, or pending.
/// - Every non-quarantined record has passed signature, polyglot, and content
///   validation.
/// - `content_hash` identifies byte content, not filename, and is the sole
///   key for duplicate lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UploadedFileRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub stored_filename: String,
    pub original_filename: String,
    /// Hex-encoded SHA-256 digest of the final on-disk bytes.
    pub content_hash: String,
    pub byte_size: i64,
    pub declared_mime_type: String,
    pub storage_path: String,
    pub is_quarantined: bool,
    pub scan_status: ScanStatus,
    pub created_at: DateTime<Utc>,
}

impl UploadedFileRecord {
    /// Name used for the entry inside the quarantine directory.
    pub fn quarantine_entry_name(&self) -> String {
        format!("{}-{}", self.id, self.stored_filename)
    }

    /// Check the quarantine/scan-status invariant for this record.
    pub fn quarantine_state_consistent(&self) -> bool {
        !self.is_quarantined
            || matches!(
                self.scan_status,
                ScanStatus::Infected | ScanStatus::Error | ScanStatus::Pending
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(is_quarantined: bool, scan_status: ScanStatus) -> UploadedFileRecord {
        UploadedFileRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            stored_filename: "abc.jpg".to_string(),
            original_filename: "photo.jpg".to_string(),
            content_hash: "00".repeat(32),
            byte_size: 123,
            declared_mime_type: "image/jpeg".to_string(),
            storage_path: "/data/uploads/abc.jpg".to_string(),
            is_quarantined,
            scan_status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn quarantine_invariant_holds_for_valid_states() {
        assert!(record(false, ScanStatus::Clean).quarantine_state_consistent());
        assert!(record(true, ScanStatus::Infected).quarantine_state_consistent());
        assert!(record(true, ScanStatus::Error).quarantine_state_consistent());
        assert!(record(true, ScanStatus::Pending).quarantine_state_consistent());
    }

    #[test]
    fn quarantine_invariant_rejects_clean_quarantined() {
        assert!(!record(true, ScanStatus::Clean).quarantine_state_consistent());
    }

    #[test]
    fn quarantine_entry_name_combines_id_and_filename() {
        let r = record(true, ScanStatus::Infected);
        let name = r.quarantine_entry_name();
        assert!(name.starts_with(&r.id.to_string()));
        assert!(name.ends_with("-abc.jpg"));
    }

    #[test]
    fn scan_status_round_trips_through_str() {
        for status in [
            ScanStatus::Pending,
            ScanStatus::Clean,
            ScanStatus::Infected,
            ScanStatus::Error,
        ] {
            assert_eq!(status.to_string(), status.as_str());
        }
    }
}
