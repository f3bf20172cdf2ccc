//! Logging setup for Model Orchestrator
//!
//! This crate installs the global `tracing` subscriber: an `EnvFilter`
//! honoring `RUST_LOG`, human-readable or JSON output, and an optional
//! daily-rolling log file.

pub mod logger;

// Re-export commonly used types
pub use logger::{init_logging, LoggingConfig, LoggingGuard};
