//! Default configuration values and locations

use std::path::PathBuf;

/// Name of the per-user data directory under the home directory
pub const APP_DIR_NAME: &str = ".model-orchestrator";

/// Default share of system memory a model may use
pub const DEFAULT_MAX_MEMORY_USAGE: f64 = 0.7;

/// Lower clamp for `max_memory_usage`
pub const MIN_MEMORY_USAGE: f64 = 0.1;

/// Upper clamp for `max_memory_usage`
pub const MAX_MEMORY_USAGE: f64 = 0.9;

/// Default number of performance samples kept per model
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Default storage budget in GB before eviction starts
pub const DEFAULT_CLEANUP_THRESHOLD_GB: f64 = 10.0;

/// Default custom weight for models without an entry
pub const DEFAULT_MODEL_WEIGHT: f64 = 1.0;

/// Base directory for configuration, models and caches
pub fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Default preferences file
pub fn config_path() -> PathBuf {
    base_dir().join("config.json")
}

/// Default directory scanned for model artifacts
pub fn models_dir() -> PathBuf {
    base_dir().join("models")
}

/// Default cache directory (usage statistics live here)
pub fn cache_dir() -> PathBuf {
    base_dir().join("cache")
}

/// Default ordered device preference
pub fn preferred_devices() -> Vec<String> {
    vec!["cpu".to_string()]
}
