//! Persistent storage management for Model Orchestrator
//!
//! This crate provides the file I/O the rest of the system builds on:
//! atomic JSON documents and disk footprint accounting for model artifacts.

pub mod filesystem;
pub mod json;

// Re-export commonly used types
pub use filesystem::{directory_size, files_with_stem, remove_file_if_exists};
pub use json::JsonStore;
