//! Design constants for the ingest pipeline.

/// Edge length of the square thumbnail (and video poster), in pixels.
pub const THUMB_SIZE: u32 = 200;

/// JPEG quality used for thumbnails.
pub const THUMB_QUALITY: u8 = 85;

/// Sources wider than this get a medium derivative, capped at this width.
pub const MEDIUM_WIDTH: u32 = 800;

/// JPEG quality used for medium derivatives.
pub const MEDIUM_QUALITY: u8 = 90;

/// Container extension every re-encoded video is normalized to.
pub const NORMALIZED_VIDEO_EXT: &str = ".mp4";

/// Extension used for video poster frames.
pub const POSTER_EXT: &str = ".jpg";

/// Directory (sibling of the original) holding thumbnails and posters.
pub const THUMBS_DIR: &str = "thumbs";

/// Directory (sibling of the original) holding medium derivatives.
pub const MEDIUM_DIR: &str = "medium";

/// Raster formats accepted by the classifier.
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".heic", ".webp"];

/// Container formats accepted by the classifier.
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv"];
