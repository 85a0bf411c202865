//! Kin Core Library
//!
//! This crate provides the domain models, error types, configuration and design
//! constants shared by every Kin Gallery ingest component.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{Config, EncoderConfig, VariantConfig, WorkerConfig};
pub use error::{LogLevel, MediaError, MediaResult};
pub use models::{Dimensions, FormatClass, MediaKind, ProcessedVariant, VariantSet};
