//! Kin Storage Library
//!
//! This crate provides the storage abstraction the ingest pipeline writes through,
//! its local filesystem implementation, and the content-addressed path layout.
//!
//! # Storage path format
//!
//! Paths are relative to the media root and `/`-separated:
//!
//! - **Original**: `{owner_id}/{year}/{month:02}/{digest}{ext}`
//! - **Thumbnail**: `{owner_id}/{year}/{month:02}/thumbs/{digest}{ext}`
//! - **Medium**: `{owner_id}/{year}/{month:02}/medium/{digest}{ext}`
//! - **Video poster**: `{owner_id}/{year}/{month:02}/thumbs/{digest}.jpg`
//!
//! Path generation is centralized in the `keys` module. Because a path depends only
//! on owner, capture month and content digest, re-submitting identical bytes always
//! lands on the same files.

pub mod keys;
pub mod local;
pub mod traits;

// Re-export commonly used types
pub use keys::{derive_paths, poster_path, MediaPaths};
pub use local::LocalStorage;
pub use traits::{Storage, StorageError, StorageResult, WriteOutcome};
