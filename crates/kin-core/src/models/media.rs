use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Pixel dimensions of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Sentinel for dimensions that have not been (or could not be) probed.
    pub const UNKNOWN: Dimensions = Dimensions {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl Display for Dimensions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Result of classifying a filename by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatClass {
    Image,
    Video,
    Unsupported,
}

/// Kind of media a VariantSet was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// One physical derivative file.
///
/// `digest` is always the digest of the bytes stored at `path`. For the original
/// of an image those bytes are the unmodified upload, so it equals the source digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedVariant {
    /// Storage path relative to the media root, `/`-separated
    pub path: String,
    pub dimensions: Dimensions,
    pub size_bytes: u64,
    pub digest: String,
}

/// Everything one ingest call wrote.
///
/// Images carry `thumb` (and `medium` when wider than the medium threshold).
/// Videos carry `poster`, and their `original` is the re-encoded file rather
/// than the uploaded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSet {
    pub kind: MediaKind,
    /// Digest of the uploaded bytes; the dedup key for the caller's record.
    pub source_digest: String,
    pub original: ProcessedVariant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium: Option<ProcessedVariant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<ProcessedVariant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster: Option<ProcessedVariant>,
}

impl VariantSet {
    /// The square preview: `thumb` for images, `poster` for videos.
    pub fn preview(&self) -> Option<&ProcessedVariant> {
        self.thumb.as_ref().or(self.poster.as_ref())
    }

    /// Present variants with their labels, in a stable order
    /// (original, medium, thumb, poster).
    pub fn variants(&self) -> impl Iterator<Item = (&'static str, &ProcessedVariant)> {
        std::iter::once(("original", &self.original))
            .chain(self.medium.as_ref().map(|v| ("medium", v)))
            .chain(self.thumb.as_ref().map(|v| ("thumb", v)))
            .chain(self.poster.as_ref().map(|v| ("poster", v)))
    }
}
