//! Format classification by filename extension.
//!
//! Only the extension is consulted; content is never sniffed here.

use kin_core::constants::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use kin_core::FormatClass;
use std::path::Path;

/// Lowercased extension of `filename` including the leading dot, if any.
pub fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e.to_lowercase()))
}

pub fn classify(filename: &str) -> FormatClass {
    match extension(filename) {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => FormatClass::Image,
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => FormatClass::Video,
        _ => FormatClass::Unsupported,
    }
}
