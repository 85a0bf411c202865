//! Storage abstraction trait
//!
//! This module defines the Storage trait the ingest pipeline writes through.

use async_trait::async_trait;
use kin_core::MediaError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for MediaError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::IoError(e) => MediaError::Io(e),
            other => MediaError::Storage(other.to_string()),
        }
    }
}

/// What a conditional write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// This call published the file.
    Written,
    /// A file was already present at the path; nothing was changed.
    AlreadyPresent,
}

/// Storage abstraction trait
///
/// Paths are the relative, `/`-separated paths produced by [`crate::keys`].
/// Writes never overwrite: a path, once populated, keeps its bytes.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check if a file exists
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Store `data` at `path` unless a file is already there.
    ///
    /// The existence decision is made by a single atomic filesystem operation, so
    /// concurrent writers of the same path produce exactly one `Written`.
    async fn put_if_absent(&self, path: &str, data: Vec<u8>) -> StorageResult<WriteOutcome>;

    /// Read a stored file
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Size in bytes of a stored file
    async fn content_length(&self, path: &str) -> StorageResult<u64>;

    /// Filesystem location of `path`, for handing to external processes.
    fn local_path(&self, path: &str) -> StorageResult<PathBuf>;

    /// Reserve a unique staging file next to `path` for an external writer.
    ///
    /// The staging file keeps the extension of `path` so encoders can infer the
    /// output format from it. It does not exist until something writes it.
    async fn stage(&self, path: &str) -> StorageResult<PathBuf>;

    /// Publish a staged file at `path` (no-clobber). The staged file is consumed.
    async fn commit(&self, staged: &Path, path: &str) -> StorageResult<WriteOutcome>;

    /// Remove a staged file that will not be committed. Missing files are ignored.
    async fn discard(&self, staged: &Path);
}
