use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A private on-disk copy of an upload, removed when dropped.
///
/// Names are `{digest}-{uuid}{ext}`, so concurrent ingests of identical bytes
/// never share (or delete) each other's input.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub async fn create(dir: &Path, digest: &str, ext: &str, data: &[u8]) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let scratch = Self {
            path: dir.join(format!("{}-{}{}", digest, Uuid::new_v4().simple(), ext)),
        };

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&scratch.path)
            .await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(scratch)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now. Drop does the same synchronously as a last resort.
    pub async fn remove(mut self) {
        let path = std::mem::take(&mut self.path);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
            }
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scratch_file_removed_explicitly() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create(dir.path(), "abc", ".mov", b"video").await.unwrap();

        let path = scratch.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"video");
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("abc-"));
        assert_eq!(path.extension().unwrap(), "mov");

        scratch.remove().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_scratch_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchFile::create(dir.path(), "abc", ".mp4", b"x").await.unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_identical_content_gets_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = ScratchFile::create(dir.path(), "same", ".mkv", b"1").await.unwrap();
        let b = ScratchFile::create(dir.path(), "same", ".mkv", b"1").await.unwrap();
        assert_ne!(a.path(), b.path());

        a.remove().await;
        assert!(b.path().exists());
    }
}
