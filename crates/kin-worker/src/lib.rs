//! Ingest worker pool.
//!
//! [`IngestQueue`] bounds how many ingests (and therefore encoder processes)
//! run at once. Jobs wait in a bounded channel; a full channel is reported to
//! the caller instead of growing without limit.

pub mod handler;
pub mod queue;

pub use handler::IngestHandler;
pub use queue::{IngestHandle, IngestJob, IngestQueue};
