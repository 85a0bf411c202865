//! Kin Media Processing Library
//!
//! This crate turns an uploaded byte buffer into a content-addressed set of stored
//! variants: the original plus a square thumbnail and an optional medium copy for
//! images, or a normalized MP4 plus a poster frame for videos.

pub mod format;
pub mod hashing;
pub mod pipeline;

#[cfg(feature = "image")]
pub mod image;

#[cfg(feature = "video")]
pub mod video;

// Re-export commonly used types
pub use format::{classify, extension};
pub use hashing::{digest, digest_file};
pub use pipeline::MediaPipeline;

#[cfg(feature = "image")]
pub use crate::image::ImageVariantGenerator;

#[cfg(feature = "video")]
pub use crate::video::{Encoder, FfmpegEncoder, VideoTranscoder};
