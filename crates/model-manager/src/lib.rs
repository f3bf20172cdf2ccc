//! Model catalog and adaptive selection for Model Orchestrator
//!
//! This crate discovers local model artifacts, filters and ranks them against
//! the hardware and a task's requirements, learns from reported executions,
//! and keeps the artifact directory within its storage budget.

pub mod catalog;
pub mod history;
pub mod metadata;
pub mod recommendations;
pub mod selector;
pub mod stats;

// Re-export commonly used types
pub use catalog::{ModelCatalog, ScanIssue, ScanReport};
pub use history::{HistoryAverages, PerformanceHistory};
pub use metadata::MetadataExtractor;
pub use recommendations::{ExpectedPerformance, HardwareRecommendation};
pub use selector::{AdaptiveSelector, CleanupReport, DEFAULT_TOP_K};
pub use stats::{StatsStore, UsageStats};
