use crate::traits::{Storage, StorageError, StorageResult, WriteOutcome};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Local filesystem storage implementation
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/kin/media")
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    /// Convert a storage path to a filesystem path with security validation
    ///
    /// Only plain relative components are accepted, so a path can never escape
    /// the storage root.
    fn key_to_path(&self, storage_path: &str) -> StorageResult<PathBuf> {
        if storage_path.is_empty() || storage_path.contains('\\') {
            return Err(StorageError::InvalidPath(storage_path.to_string()));
        }

        let relative = Path::new(storage_path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidPath(storage_path.to_string()));
        }

        Ok(self.base_path.join(relative))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Unique sibling of `target` that keeps its extension: `.{stem}.{uuid}.tmp{.ext}`.
    fn staging_path_for(target: &Path) -> PathBuf {
        let stem = target
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("file");
        let ext = target
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let name = format!(".{}.{}.tmp{}", stem, Uuid::new_v4().simple(), ext);
        target.with_file_name(name)
    }

    /// Publish `staged` at `target` without ever replacing an existing file.
    ///
    /// A hard link fails with `AlreadyExists` when another writer got there first.
    /// Filesystems without hard links fall back to rename, which may replace a
    /// concurrently published file with identical content-addressed bytes.
    async fn publish(staged: &Path, target: &Path) -> StorageResult<WriteOutcome> {
        match fs::hard_link(staged, target).await {
            Ok(()) => {
                let _ = fs::remove_file(staged).await;
                Ok(WriteOutcome::Written)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(staged).await;
                Ok(WriteOutcome::AlreadyPresent)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(staged.display().to_string()))
            }
            Err(e) => {
                tracing::debug!(
                    staged = %staged.display(),
                    error = %e,
                    "Hard link unavailable, publishing by rename"
                );
                if fs::try_exists(target).await.unwrap_or(false) {
                    let _ = fs::remove_file(staged).await;
                    return Ok(WriteOutcome::AlreadyPresent);
                }
                fs::rename(staged, target).await.map_err(|e| {
                    StorageError::WriteFailed(format!(
                        "Failed to move {} to {}: {}",
                        staged.display(),
                        target.display(),
                        e
                    ))
                })?;
                Ok(WriteOutcome::Written)
            }
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn exists(&self, storage_path: &str) -> StorageResult<bool> {
        let path = self.key_to_path(storage_path)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn put_if_absent(&self, storage_path: &str, data: Vec<u8>) -> StorageResult<WriteOutcome> {
        let path = self.key_to_path(storage_path)?;

        if fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(key = %storage_path, "File already present, skipping write");
            return Ok(WriteOutcome::AlreadyPresent);
        }

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();
        let size = data.len();
        let staged = Self::staging_path_for(&path);

        let write = async {
            let mut file = fs::File::create(&staged).await.map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to create file {}: {}",
                    staged.display(),
                    e
                ))
            })?;

            file.write_all(&data).await.map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to write file {}: {}",
                    staged.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to sync file {}: {}",
                    staged.display(),
                    e
                ))
            })
        };

        if let Err(e) = write.await {
            self.discard(&staged).await;
            return Err(e);
        }

        let outcome = Self::publish(&staged, &path).await?;

        tracing::info!(
            path = %path.display(),
            key = %storage_path,
            size_bytes = size,
            outcome = ?outcome,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write finished"
        );

        Ok(outcome)
    }

    async fn read(&self, storage_path: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(storage_path)?;

        fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(storage_path.to_string()),
            _ => StorageError::ReadFailed(format!(
                "Failed to read file {}: {}",
                path.display(),
                e
            )),
        })
    }

    async fn content_length(&self, storage_path: &str) -> StorageResult<u64> {
        let path = self.key_to_path(storage_path)?;
        let meta = fs::metadata(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(storage_path.to_string()),
            _ => StorageError::ReadFailed(e.to_string()),
        })?;
        Ok(meta.len())
    }

    fn local_path(&self, storage_path: &str) -> StorageResult<PathBuf> {
        self.key_to_path(storage_path)
    }

    async fn stage(&self, storage_path: &str) -> StorageResult<PathBuf> {
        let path = self.key_to_path(storage_path)?;
        self.ensure_parent_dir(&path).await?;
        Ok(Self::staging_path_for(&path))
    }

    async fn commit(&self, staged: &Path, storage_path: &str) -> StorageResult<WriteOutcome> {
        let path = self.key_to_path(storage_path)?;
        let outcome = Self::publish(staged, &path).await?;

        tracing::info!(
            path = %path.display(),
            key = %storage_path,
            outcome = ?outcome,
            "Local storage commit finished"
        );

        Ok(outcome)
    }

    async fn discard(&self, staged: &Path) {
        if let Err(e) = fs::remove_file(staged).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    staged = %staged.display(),
                    error = %e,
                    "Failed to remove staged file"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_if_absent_then_read() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let outcome = storage
            .put_if_absent("7/2024/03/abc.jpg", b"bytes".to_vec())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Written);

        assert!(storage.exists("7/2024/03/abc.jpg").await.unwrap());
        assert_eq!(storage.read("7/2024/03/abc.jpg").await.unwrap(), b"bytes");
        assert_eq!(storage.content_length("7/2024/03/abc.jpg").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_put_if_absent_never_overwrites() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage
            .put_if_absent("1/2020/01/x.png", b"first".to_vec())
            .await
            .unwrap();
        let outcome = storage
            .put_if_absent("1/2020/01/x.png", b"second".to_vec())
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::AlreadyPresent);
        assert_eq!(storage.read("1/2020/01/x.png").await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_concurrent_writers_publish_once() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage
                    .put_if_absent("5/2021/06/same.jpg", vec![9u8; 4096])
                    .await
                    .unwrap()
            }));
        }

        let mut written = 0;
        for handle in handles {
            if handle.await.unwrap() == WriteOutcome::Written {
                written += 1;
            }
        }
        assert_eq!(written, 1);

        // No staging files are left behind next to the published file.
        let mut entries = fs::read_dir(dir.path().join("5/2021/06")).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["same.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_stage_and_commit() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let staged = storage.stage("3/2022/11/v.mp4").await.unwrap();
        assert_eq!(staged.extension().unwrap(), "mp4");
        assert!(!staged.exists());

        fs::write(&staged, b"encoded").await.unwrap();
        let outcome = storage.commit(&staged, "3/2022/11/v.mp4").await.unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        assert!(!staged.exists());
        assert_eq!(storage.read("3/2022/11/v.mp4").await.unwrap(), b"encoded");
    }

    #[tokio::test]
    async fn test_commit_missing_staged_file_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let staged = storage.stage("3/2022/11/thumbs/v.jpg").await.unwrap();
        let result = storage.commit(&staged, "3/2022/11/thumbs/v.jpg").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let result = storage.read("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));

        let result = storage.put_if_absent("7/./../x", vec![1]).await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let result = storage.read("nope/file.jpg").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert!(!storage.exists("nope/file.jpg").await.unwrap());
    }
}
