//! Telemetry initialization
//!
//! Structured logging through `tracing`. Filtering follows `RUST_LOG` when set.

mod init_basic;

pub use init_basic::{default_filter, init_telemetry, LogFormat};
