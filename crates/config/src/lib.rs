//! Configuration management for Model Orchestrator
//!
//! This crate owns the user's selection preferences: their defaults, their
//! validation when loaded from disk, and every explicit update, each of which
//! is persisted immediately.

pub mod defaults;
pub mod manager;
pub mod preferences;

// Re-export commonly used types
pub use manager::ConfigManager;
pub use preferences::{PreferencesUpdate, SelectionPreferences};
