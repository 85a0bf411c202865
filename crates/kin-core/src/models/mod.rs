//! Domain models for the ingest pipeline

pub mod media;

pub use media::{Dimensions, FormatClass, MediaKind, ProcessedVariant, VariantSet};
