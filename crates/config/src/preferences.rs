//! Selection preferences
//!
//! The preferences snapshot read by the catalog and the selector, the on-disk
//! representation it is validated from, and the partial update applied by
//! [`ConfigManager`](crate::ConfigManager).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use common::error::{Error, Result};
use common::types::{AccuracyPreference, HardwareType, PerformanceMode};
use common::utils::gib_to_bytes;
use storage_adapter::JsonStore;

use crate::defaults;

/// User preferences for model selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionPreferences {
    /// Weight triple selector
    pub performance_mode: PerformanceMode,

    /// Quantization penalty or bonus
    pub accuracy_preference: AccuracyPreference,

    /// Share of system memory a model may use, in [0.1, 0.9]
    pub max_memory_usage: f64,

    /// Device tags in order of preference (e.g. `cpu`, `cuda`)
    pub preferred_devices: Vec<String>,

    /// Directory holding usage statistics
    pub cache_dir: PathBuf,

    /// Rank with usage statistics instead of the static catalog score
    pub enable_adaptive_selection: bool,

    /// Performance samples kept per model (0 keeps everything)
    pub model_usage_history_size: usize,

    /// Storage budget in GB; 0 disables eviction
    pub auto_cleanup_threshold: f64,

    /// Per-model score multipliers
    pub custom_model_weights: BTreeMap<String, f64>,
}

impl Default for SelectionPreferences {
    fn default() -> Self {
        Self {
            performance_mode: PerformanceMode::Balanced,
            accuracy_preference: AccuracyPreference::Medium,
            max_memory_usage: defaults::DEFAULT_MAX_MEMORY_USAGE,
            preferred_devices: defaults::preferred_devices(),
            cache_dir: defaults::cache_dir(),
            enable_adaptive_selection: true,
            model_usage_history_size: defaults::DEFAULT_HISTORY_SIZE,
            auto_cleanup_threshold: defaults::DEFAULT_CLEANUP_THRESHOLD_GB,
            custom_model_weights: BTreeMap::new(),
        }
    }
}

impl SelectionPreferences {
    /// Loads preferences from a JSON document
    ///
    /// A missing, unreadable or malformed document yields the defaults. A
    /// well-formed document carrying an unknown enum value is an error.
    pub fn load(store: &JsonStore) -> Result<Self> {
        let file = match store.load::<PreferencesFile>() {
            Ok(Some(file)) => file,
            Ok(None) => return Ok(Self::default()),
            Err(e) => {
                warn!("Error loading preferences from {:?}: {}. Using defaults.", store.path(), e);
                return Ok(Self::default());
            }
        };

        file.into_preferences()
    }

    /// Persists the preferences
    pub fn save(&self, store: &JsonStore) -> Result<()> {
        store.save(self)
    }

    /// Custom weight for a model, 1.0 when unlisted
    pub fn custom_weight(&self, model_name: &str) -> f64 {
        self.custom_model_weights
            .get(model_name)
            .copied()
            .unwrap_or(defaults::DEFAULT_MODEL_WEIGHT)
    }

    /// Memory a model may use on a machine with `total_memory` bytes
    pub fn memory_budget(&self, total_memory: u64) -> f64 {
        total_memory as f64 * self.max_memory_usage
    }

    /// Storage budget in bytes (0 when eviction is disabled)
    pub fn cleanup_threshold_bytes(&self) -> u64 {
        gib_to_bytes(self.auto_cleanup_threshold)
    }

    /// Preferred devices that parse as hardware tags, in order
    pub fn preferred_hardware(&self) -> Vec<HardwareType> {
        self.preferred_devices
            .iter()
            .filter_map(|device| HardwareType::from_device_id(device))
            .collect()
    }

    /// Forces every numeric value into its valid domain
    pub fn normalize(&mut self) {
        self.max_memory_usage = clamp_memory_usage(self.max_memory_usage);
        self.auto_cleanup_threshold = clamp_cleanup_threshold(self.auto_cleanup_threshold);
        for weight in self.custom_model_weights.values_mut() {
            *weight = clamp_weight(*weight);
        }
        self.preferred_devices = normalize_devices(std::mem::take(&mut self.preferred_devices));
        if self.preferred_devices.is_empty() {
            self.preferred_devices = defaults::preferred_devices();
        }
    }

    /// Applies a partial update, clamping numeric values
    pub fn apply(&mut self, update: PreferencesUpdate) {
        if let Some(mode) = update.performance_mode {
            self.performance_mode = mode;
        }
        if let Some(accuracy) = update.accuracy_preference {
            self.accuracy_preference = accuracy;
        }
        if let Some(fraction) = update.max_memory_usage {
            self.max_memory_usage = clamp_memory_usage(fraction);
        }
        if let Some(devices) = update.preferred_devices {
            let devices = normalize_devices(devices);
            if devices.is_empty() {
                warn!("Ignoring empty preferred device list");
            } else {
                self.preferred_devices = devices;
            }
        }
        if let Some(cache_dir) = update.cache_dir {
            self.cache_dir = cache_dir;
        }
        if let Some(enabled) = update.enable_adaptive_selection {
            self.enable_adaptive_selection = enabled;
        }
        if let Some(size) = update.model_usage_history_size {
            self.model_usage_history_size = size;
        }
        if let Some(threshold) = update.auto_cleanup_threshold {
            self.auto_cleanup_threshold = clamp_cleanup_threshold(threshold);
        }
    }
}

/// Partial preferences update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferencesUpdate {
    /// New performance mode
    pub performance_mode: Option<PerformanceMode>,
    /// New accuracy preference
    pub accuracy_preference: Option<AccuracyPreference>,
    /// New memory fraction, clamped to [0.1, 0.9]
    pub max_memory_usage: Option<f64>,
    /// New device order; an empty list is ignored
    pub preferred_devices: Option<Vec<String>>,
    /// New statistics directory
    pub cache_dir: Option<PathBuf>,
    /// Toggle adaptive selection
    pub enable_adaptive_selection: Option<bool>,
    /// New history cap
    pub model_usage_history_size: Option<usize>,
    /// New storage budget in GB, clamped to >= 0
    pub auto_cleanup_threshold: Option<f64>,
}

impl PreferencesUpdate {
    /// Returns true if the update changes nothing
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// On-disk shape of the preferences document
///
/// Enum fields are kept as strings so that unknown values can be reported as
/// validation errors instead of parse failures. Numeric fields are kept as raw
/// JSON values so that out-of-range numbers are clamped instead of rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PreferencesFile {
    performance_mode: Option<String>,
    accuracy_preference: Option<String>,
    max_memory_usage: Option<Value>,
    preferred_devices: Option<Vec<String>>,
    cache_dir: Option<PathBuf>,
    enable_adaptive_selection: Option<bool>,
    model_usage_history_size: Option<Value>,
    auto_cleanup_threshold: Option<Value>,
    custom_model_weights: Option<BTreeMap<String, Value>>,
}

impl PreferencesFile {
    fn into_preferences(self) -> Result<SelectionPreferences> {
        let defaults = SelectionPreferences::default();

        let performance_mode = match self.performance_mode {
            Some(value) => value
                .parse()
                .map_err(|_| Error::invalid_preference("performance_mode", value))?,
            None => defaults.performance_mode,
        };

        let accuracy_preference = match self.accuracy_preference {
            Some(value) => value
                .parse()
                .map_err(|_| Error::invalid_preference("accuracy_preference", value))?,
            None => defaults.accuracy_preference,
        };

        let mut preferences = SelectionPreferences {
            performance_mode,
            accuracy_preference,
            max_memory_usage: number_field(
                "max_memory_usage",
                self.max_memory_usage,
                defaults.max_memory_usage,
            ),
            preferred_devices: self.preferred_devices.unwrap_or(defaults.preferred_devices),
            cache_dir: self.cache_dir.unwrap_or(defaults.cache_dir),
            enable_adaptive_selection: self
                .enable_adaptive_selection
                .unwrap_or(defaults.enable_adaptive_selection),
            model_usage_history_size: history_size_field(
                self.model_usage_history_size,
                defaults.model_usage_history_size,
            ),
            auto_cleanup_threshold: number_field(
                "auto_cleanup_threshold",
                self.auto_cleanup_threshold,
                defaults.auto_cleanup_threshold,
            ),
            custom_model_weights: self
                .custom_model_weights
                .unwrap_or_default()
                .into_iter()
                .map(|(name, value)| {
                    let weight =
                        number_field("custom_model_weights", Some(value), defaults::DEFAULT_MODEL_WEIGHT);
                    (name, weight)
                })
                .collect(),
        };
        preferences.normalize();

        Ok(preferences)
    }
}

/// Reads a numeric field, falling back to `default` for non-numbers
fn number_field(field: &str, value: Option<Value>, default: f64) -> f64 {
    match value {
        None | Some(Value::Null) => default,
        Some(value) => value.as_f64().unwrap_or_else(|| {
            warn!("Ignoring non-numeric {} value {}", field, value);
            default
        }),
    }
}

/// Reads the history cap; negative values clamp to 0 and fractions round down
fn history_size_field(value: Option<Value>, default: usize) -> usize {
    let size = number_field("model_usage_history_size", value, default as f64);
    size.max(0.0).floor() as usize
}

fn clamp_memory_usage(fraction: f64) -> f64 {
    if fraction.is_nan() {
        return defaults::DEFAULT_MAX_MEMORY_USAGE;
    }
    fraction.clamp(defaults::MIN_MEMORY_USAGE, defaults::MAX_MEMORY_USAGE)
}

fn clamp_cleanup_threshold(threshold: f64) -> f64 {
    if threshold.is_nan() {
        return defaults::DEFAULT_CLEANUP_THRESHOLD_GB;
    }
    threshold.max(0.0)
}

pub(crate) fn clamp_weight(weight: f64) -> f64 {
    if weight.is_nan() {
        return defaults::DEFAULT_MODEL_WEIGHT;
    }
    weight.max(0.0)
}

fn normalize_devices(devices: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(devices.len());
    for device in devices {
        let device = device.trim().to_lowercase();
        if !device.is_empty() && !normalized.contains(&device) {
            normalized.push(device);
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store_with(dir: &TempDir, contents: &str) -> JsonStore {
        let path = dir.path().join("config.json");
        fs::write(&path, contents).unwrap();
        JsonStore::new(path)
    }

    #[test]
    fn test_missing_file_yields_documented_defaults() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path().join("config.json"));
        let preferences = SelectionPreferences::load(&store).unwrap();

        assert_eq!(preferences, SelectionPreferences::default());
        assert_eq!(preferences.performance_mode, PerformanceMode::Balanced);
        assert_eq!(preferences.accuracy_preference, AccuracyPreference::Medium);
        assert_eq!(preferences.max_memory_usage, 0.7);
        assert_eq!(preferences.preferred_devices, vec!["cpu".to_string()]);
        assert!(preferences.enable_adaptive_selection);
        assert_eq!(preferences.model_usage_history_size, 1000);
        assert_eq!(preferences.auto_cleanup_threshold, 10.0);
        assert!(preferences.custom_model_weights.is_empty());
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, "{ this is not json");
        let preferences = SelectionPreferences::load(&store).unwrap();
        assert_eq!(preferences, SelectionPreferences::default());
    }

    #[test]
    fn test_invalid_enum_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, r#"{"performance_mode": "turbo"}"#);
        let err = SelectionPreferences::load(&store).unwrap_err();
        assert!(err.is_invalid_preference());

        let store = store_with(&dir, r#"{"accuracy_preference": "perfect"}"#);
        let err = SelectionPreferences::load(&store).unwrap_err();
        assert!(err.is_invalid_preference());
    }

    #[test]
    fn test_partial_file_fills_defaults_and_clamps() {
        let dir = TempDir::new().unwrap();
        let store = store_with(
            &dir,
            r#"{
                "performance_mode": "speed",
                "max_memory_usage": 1.0,
                "preferred_devices": ["CUDA", "cpu", "cuda"],
                "custom_model_weights": {"llama": 1.5, "bad": -2.0}
            }"#,
        );
        let preferences = SelectionPreferences::load(&store).unwrap();

        assert_eq!(preferences.performance_mode, PerformanceMode::Speed);
        assert_eq!(preferences.accuracy_preference, AccuracyPreference::Medium);
        assert_eq!(preferences.max_memory_usage, 0.9);
        assert_eq!(preferences.preferred_devices, vec!["cuda".to_string(), "cpu".to_string()]);
        assert_eq!(preferences.custom_weight("llama"), 1.5);
        assert_eq!(preferences.custom_weight("bad"), 0.0);
        assert_eq!(preferences.custom_weight("unlisted"), 1.0);
    }

    #[test]
    fn test_out_of_range_numbers_are_clamped_not_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_with(
            &dir,
            r#"{
                "performance_mode": "memory",
                "model_usage_history_size": -5,
                "auto_cleanup_threshold": -1,
                "max_memory_usage": "lots",
                "custom_model_weights": {"llama": -3, "phi": "heavy"}
            }"#,
        );
        let preferences = SelectionPreferences::load(&store).unwrap();

        assert_eq!(preferences.performance_mode, PerformanceMode::Memory);
        assert_eq!(preferences.model_usage_history_size, 0);
        assert_eq!(preferences.auto_cleanup_threshold, 0.0);
        assert_eq!(preferences.max_memory_usage, 0.7);
        assert_eq!(preferences.custom_weight("llama"), 0.0);
        assert_eq!(preferences.custom_weight("phi"), 1.0);
    }

    #[test]
    fn test_fractional_history_size_rounds_down() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, r#"{"model_usage_history_size": 12.7}"#);
        let preferences = SelectionPreferences::load(&store).unwrap();
        assert_eq!(preferences.model_usage_history_size, 12);
    }

    #[test]
    fn test_apply_clamps_values() {
        let mut preferences = SelectionPreferences::default();
        preferences.apply(PreferencesUpdate {
            max_memory_usage: Some(0.01),
            auto_cleanup_threshold: Some(-4.0),
            preferred_devices: Some(vec![]),
            ..Default::default()
        });

        assert_eq!(preferences.max_memory_usage, 0.1);
        assert_eq!(preferences.auto_cleanup_threshold, 0.0);
        assert_eq!(preferences.preferred_devices, vec!["cpu".to_string()]);
        assert_eq!(preferences.cleanup_threshold_bytes(), 0);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path().join("config.json"));

        let mut preferences = SelectionPreferences::default();
        preferences.performance_mode = PerformanceMode::Memory;
        preferences.custom_model_weights.insert("phi".to_string(), 2.0);
        preferences.save(&store).unwrap();

        assert_eq!(SelectionPreferences::load(&store).unwrap(), preferences);
    }

    #[test]
    fn test_preferred_hardware() {
        let mut preferences = SelectionPreferences::default();
        preferences.preferred_devices = vec!["cuda:0".to_string(), "cpu".to_string(), "tpu".to_string()];
        assert_eq!(preferences.preferred_hardware(), vec![HardwareType::Cuda, HardwareType::Cpu]);
    }
}
