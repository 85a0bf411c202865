//! Kin Infrastructure Library
//!
//! Shared infrastructure for Kin binaries:
//! - Telemetry initialization (tracing subscriber)

pub mod telemetry;

pub use telemetry::{init_telemetry, LogFormat};
