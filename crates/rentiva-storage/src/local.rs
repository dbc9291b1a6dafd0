use crate::error::{StorageError, StorageResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem store rooted at one directory.
///
/// The same type backs both normal storage and the quarantine directory;
/// [`LocalStore::move_entry_to`] renames a file between two stores without a
/// window where both or neither copy exists.
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();

        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(LocalStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a storage key to a filesystem path, rejecting keys that could
    /// escape the store root.
    pub fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty()
            || key.contains("..")
            || key.contains('/')
            || key.contains('\\')
            || key.starts_with('.')
        {
            return Err(StorageError::InvalidKey(format!(
                "Storage key contains invalid characters: {}",
                key
            )));
        }

        Ok(self.root.join(key))
    }

    /// Write bytes under `key`, syncing to disk before returning.
    pub async fn write(&self, key: &str, data: &[u8]) -> StorageResult<PathBuf> {
        let path = self.key_to_path(key)?;
        let size = data.len();
        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(data).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local store write successful"
        );

        Ok(path)
    }

    pub async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        fs::read(&path).await.map_err(|e| {
            StorageError::ReadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })
    }

    /// Delete the file under `key`. Deleting a missing key is not an error.
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::debug!(path = %path.display(), key = %key, "Local store delete successful");

        Ok(())
    }

    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    /// Move an existing file at `source` into the store under `key` with a
    /// single rename. The source must be on the same filesystem.
    pub async fn adopt(&self, key: &str, source: &Path) -> StorageResult<PathBuf> {
        let dest = self.key_to_path(key)?;

        fs::rename(source, &dest).await.map_err(|e| {
            StorageError::MoveFailed(format!(
                "Failed to move {} to {}: {}",
                source.display(),
                dest.display(),
                e
            ))
        })?;

        tracing::debug!(
            from = %source.display(),
            to = %dest.display(),
            "Adopted file into local store"
        );

        Ok(dest)
    }

    /// Atomically move the file under `key` into another store under
    /// `dest_key`. Rename semantics: at no instant do both or neither copy
    /// exist.
    pub async fn move_entry_to(
        &self,
        key: &str,
        dest: &LocalStore,
        dest_key: &str,
    ) -> StorageResult<PathBuf> {
        let from = self.key_to_path(key)?;
        let to = dest.key_to_path(dest_key)?;

        if !fs::try_exists(&from).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        fs::rename(&from, &to).await.map_err(|e| {
            StorageError::MoveFailed(format!(
                "Failed to move {} to {}: {}",
                from.display(),
                to.display(),
                e
            ))
        })?;

        tracing::info!(
            from = %from.display(),
            to = %to.display(),
            "Moved entry between stores"
        );

        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        let data = b"test data".to_vec();
        store.write("file.jpg", &data).await.unwrap();

        let read_back = store.read("file.jpg").await.unwrap();
        assert_eq!(data, read_back);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        for key in ["../../../etc/passwd", "a/../b", "/etc/passwd", ".hidden", ""] {
            let result = store.read(key).await;
            assert!(
                matches!(result, Err(StorageError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path()).await.unwrap();

        assert!(store.delete("missing.jpg").await.is_ok());
    }

    #[tokio::test]
    async fn test_adopt_moves_file_in() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("store")).await.unwrap();

        let src = dir.path().join("incoming.tmp");
        tokio::fs::write(&src, b"bytes").await.unwrap();

        store.adopt("final.jpg", &src).await.unwrap();

        assert!(!src.exists());
        assert_eq!(store.read("final.jpg").await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn test_move_entry_between_stores_is_exclusive() {
        let dir = tempdir().unwrap();
        let active = LocalStore::new(dir.path().join("active")).await.unwrap();
        let quarantine = LocalStore::new(dir.path().join("quarantine")).await.unwrap();

        active.write("f.jpg", b"payload").await.unwrap();

        active
            .move_entry_to("f.jpg", &quarantine, "id-f.jpg")
            .await
            .unwrap();

        assert!(!active.exists("f.jpg").await.unwrap());
        assert!(quarantine.exists("id-f.jpg").await.unwrap());
        assert_eq!(quarantine.read("id-f.jpg").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_move_missing_entry_fails() {
        let dir = tempdir().unwrap();
        let active = LocalStore::new(dir.path().join("active")).await.unwrap();
        let quarantine = LocalStore::new(dir.path().join("quarantine")).await.unwrap();

        let result = active.move_entry_to("nope.jpg", &quarantine, "x").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }
}
