//! Hardware detection for Model Orchestrator
//!
//! This crate provides the immutable hardware snapshot consumed by the model
//! catalog, and a detector that builds one from the running system.

pub mod capabilities;
pub mod detector;

// Re-export commonly used types
pub use capabilities::{AcceleratorDevice, HardwareSnapshot};
pub use detector::HardwareDetector;
