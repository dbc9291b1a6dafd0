//! Proactive disk capacity checks.
//!
//! The pipeline verifies free space before moving any bytes into storage so
//! a full disk surfaces as a distinct "insufficient capacity" error instead
//! of a mid-move write failure.

use std::path::{Path, PathBuf};

use sysinfo::Disks;

use crate::error::UploadError;

#[derive(Clone)]
pub struct CapacityChecker {
    min_free_bytes: u64,
}

impl CapacityChecker {
    pub fn new(min_free_mb: u64) -> Self {
        Self {
            min_free_bytes: min_free_mb * 1024 * 1024,
        }
    }

    /// Available bytes on the filesystem holding `path`, if it can be
    /// determined. Picks the longest matching mount point.
    fn available_space_for(path: &Path) -> Option<u64> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .filter(|disk| {
                let mount = PathBuf::from(disk.mount_point());
                path.starts_with(&mount)
            })
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }

    /// Check that the filesystem holding `path` can absorb `required_bytes`
    /// while keeping the configured free-space floor. An undeterminable
    /// mount logs a warning and passes; capacity gating must not turn every
    /// upload away on hosts where disk enumeration fails.
    pub fn check_disk_space(&self, path: &Path, required_bytes: u64) -> Result<(), UploadError> {
        let total_required = required_bytes.saturating_add(self.min_free_bytes);

        let Some(available_bytes) = Self::available_space_for(path) else {
            tracing::warn!(
                path = %path.display(),
                "Could not determine disk space, skipping capacity check"
            );
            return Ok(());
        };

        if available_bytes < total_required {
            tracing::error!(
                available_bytes,
                required_bytes = total_required,
                path = %path.display(),
                "Insufficient disk space for upload"
            );
            return Err(UploadError::InsufficientCapacity {
                available: available_bytes,
                required: total_required,
            });
        }

        Ok(())
    }

    /// Async wrapper; the sysinfo refresh is blocking.
    pub async fn check_disk_space_async(
        &self,
        path: &Path,
        required_bytes: u64,
    ) -> Result<(), UploadError> {
        let path = path.to_path_buf();
        let checker = self.clone();
        tokio::task::spawn_blocking(move || checker.check_disk_space(&path, required_bytes))
            .await
            .map_err(|e| UploadError::Internal(format!("capacity check task failed: {}", e)))?
    }
}
