//! Structured logging for NodeBridge binaries.
//!
//! Console output goes to stderr so it never mixes with command output on
//! stdout; an optional daily-rolling NDJSON file sits alongside.

pub mod logger;

pub use logger::{init_logger, LoggerGuard};
