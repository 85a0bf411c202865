//! Content-addressed path derivation.
//!
//! Every function here is pure: no I/O, no clock, no counters.

use chrono::{DateTime, Datelike, Utc};
use kin_core::constants::{MEDIUM_DIR, POSTER_EXT, THUMBS_DIR};

/// Storage paths for one piece of content and its derivatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPaths {
    pub original: String,
    pub thumb: String,
    pub medium: String,
}

/// Derive the canonical paths for `digest` owned by `owner_id`, captured at `taken_at`.
///
/// `ext` includes the leading dot (e.g. `.jpg`). Year and month are taken in UTC.
pub fn derive_paths(owner_id: i64, taken_at: DateTime<Utc>, digest: &str, ext: &str) -> MediaPaths {
    let dir = format!("{}/{}/{:02}", owner_id, taken_at.year(), taken_at.month());
    let file_name = format!("{}{}", digest, ext);

    MediaPaths {
        original: format!("{}/{}", dir, file_name),
        thumb: format!("{}/{}/{}", dir, THUMBS_DIR, file_name),
        medium: format!("{}/{}/{}", dir, MEDIUM_DIR, file_name),
    }
}

/// Path of a video's poster frame: the thumbnail slot with a `.jpg` name.
pub fn poster_path(owner_id: i64, taken_at: DateTime<Utc>, digest: &str) -> String {
    derive_paths(owner_id, taken_at, digest, POSTER_EXT).thumb
}
