//! Error types module
//!
//! Every failure the ingest pipeline can surface is a [`MediaError`]. An ingest
//! either returns a complete `VariantSet` or one of these errors; there is no
//! partial-success value, so callers must not persist a record on error.
//!
//! [`MediaError::ProbeParseMiss`] is the one non-fatal kind: the video transcoder
//! logs it and continues with unknown dimensions.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like rejected input
    Debug,
    /// Warning level - for recoverable issues like a full queue
    Warn,
    /// Error level - for unexpected failures
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Unsupported file format: {filename}")]
    UnsupportedFormat { filename: String },

    #[error("Image decode failed ({format}): {message}")]
    DecodeFailure { format: String, message: String },

    #[error("Encoder {operation} failed with status {status:?}: {stderr}")]
    EncoderFailure {
        operation: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Encoder {operation} timed out after {timeout_secs}s")]
    EncoderTimeout { operation: String, timeout_secs: u64 },

    #[error("Could not read video dimensions: {0}")]
    ProbeParseMiss(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Ingest queue is full, please try again later")]
    QueueFull,

    #[error("Ingest queue is closed")]
    QueueClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for pipeline operations
pub type MediaResult<T> = Result<T, MediaError>;

/// Static metadata for each variant: (error_code, recoverable, log_level).
fn media_error_static_metadata(err: &MediaError) -> (&'static str, bool, LogLevel) {
    match err {
        MediaError::UnsupportedFormat { .. } => ("UNSUPPORTED_FORMAT", false, LogLevel::Debug),
        MediaError::DecodeFailure { .. } => ("DECODE_FAILURE", false, LogLevel::Warn),
        MediaError::EncoderFailure { .. } => ("ENCODER_FAILURE", false, LogLevel::Error),
        MediaError::EncoderTimeout { .. } => ("ENCODER_TIMEOUT", true, LogLevel::Error),
        MediaError::ProbeParseMiss(_) => ("PROBE_PARSE_MISS", true, LogLevel::Warn),
        MediaError::Storage(_) => ("STORAGE_ERROR", true, LogLevel::Error),
        MediaError::Io(_) => ("IO_ERROR", true, LogLevel::Error),
        MediaError::QueueFull => ("QUEUE_FULL", true, LogLevel::Warn),
        MediaError::QueueClosed => ("QUEUE_CLOSED", false, LogLevel::Error),
        MediaError::InvalidConfig(_) => ("INVALID_CONFIG", false, LogLevel::Error),
        MediaError::Internal(_) => ("INTERNAL_ERROR", true, LogLevel::Error),
    }
}

impl MediaError {
    /// Machine-readable error code (e.g. "ENCODER_FAILURE")
    pub fn error_code(&self) -> &'static str {
        media_error_static_metadata(self).0
    }

    /// Whether the caller may reasonably retry the same ingest.
    ///
    /// The pipeline never retries internally; this only informs caller policy.
    pub fn is_recoverable(&self) -> bool {
        media_error_static_metadata(self).1
    }

    /// Log level for this error
    pub fn log_level(&self) -> LogLevel {
        media_error_static_metadata(self).2
    }

    pub fn decode(format: impl Into<String>, message: impl ToString) -> Self {
        MediaError::DecodeFailure {
            format: format.into(),
            message: message.to_string(),
        }
    }
}
