//! Main integration module for Model Orchestrator
//!
//! [`ModelOrchestrator`] composes the preferences, the model catalog and the
//! adaptive selector into one explicitly constructed instance. Recommendation
//! requests are filtered by the catalog, scored by the selector and annotated
//! with a hardware recommendation per model; execution feedback flows back
//! into both.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use common::error::{Error, Result};
use common::models::{ExecutionReport, ModelArtifactMetadata, PerformanceSample, TaskRequirements};
use common::types::{HardwareType, PerformanceMode};
use config::{ConfigManager, PreferencesUpdate, SelectionPreferences};
use hardware_profiler::{HardwareDetector, HardwareSnapshot};
use model_manager::{
    AdaptiveSelector, CleanupReport, HardwareRecommendation, ModelCatalog, ScanReport, UsageStats,
};

/// Construction options for [`ModelOrchestrator`]
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Preferences file
    pub config_path: PathBuf,

    /// Directory scanned for model artifacts
    pub models_dir: PathBuf,

    /// Hardware to plan for; detected when absent
    pub hardware: Option<HardwareSnapshot>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            config_path: config::defaults::config_path(),
            models_dir: config::defaults::models_dir(),
            hardware: None,
        }
    }
}

impl OrchestratorOptions {
    /// Uses the given preferences file
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    /// Uses the given models directory
    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    /// Skips detection and plans for the given hardware
    pub fn with_hardware(mut self, hardware: HardwareSnapshot) -> Self {
        self.hardware = Some(hardware);
        self
    }
}

/// A candidate model with its score and how to run it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecommendation {
    /// Recommended model
    pub model: ModelArtifactMetadata,

    /// Selection score (higher is better)
    pub score: f64,

    /// Device and batch size suggestion
    pub hardware: HardwareRecommendation,
}

/// Overview of the machine and the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Hardware in use
    pub hardware: HardwareSnapshot,

    /// Number of cataloged models
    pub available_models: usize,

    /// Bytes used by the artifact directory
    pub total_cache_size: u64,

    /// Current performance mode
    pub performance_mode: PerformanceMode,

    /// Share of system memory models may use, in percent
    pub memory_usage_percent: f64,

    /// Whether ranking uses learned statistics
    pub adaptive_selection: bool,
}

/// Memory and storage accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Total system memory in bytes
    pub total_memory: u64,

    /// Sum of the minimum memory of every cataloged model
    pub used_by_models: u64,

    /// Memory the preferences allow models to use
    pub available_memory: u64,

    /// Bytes used by the artifact directory
    pub cache_size: u64,

    /// Storage budget in bytes (0 when cleanup is disabled)
    pub cache_threshold: u64,

    /// Number of cataloged models
    pub model_count: usize,

    /// Preferred devices present on this machine
    pub active_devices: Vec<String>,
}

/// Everything known about one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformanceReport {
    /// Model metadata
    pub model: ModelArtifactMetadata,

    /// Running statistics, if the model was ever reported on
    pub usage_stats: Option<UsageStats>,

    /// Recorded samples, oldest first
    pub performance_history: Vec<PerformanceSample>,

    /// Device and batch size suggestion
    pub hardware: HardwareRecommendation,
}

/// Model orchestrator
#[derive(Debug)]
pub struct ModelOrchestrator {
    /// Preferences file and snapshot
    config: ConfigManager,

    /// Directory scanned for model artifacts
    models_dir: PathBuf,

    /// Discovered models and their history
    catalog: ModelCatalog,

    /// Learned statistics
    selector: AdaptiveSelector,

    /// Outcome of the latest scan
    last_scan: ScanReport,
}

impl ModelOrchestrator {
    /// Creates an orchestrator and scans the models directory
    ///
    /// Fails if the preferences file holds an invalid value or the models
    /// directory cannot be created.
    pub fn new(options: OrchestratorOptions) -> Result<Self> {
        info!("Initializing model orchestrator");

        let config = ConfigManager::load(&options.config_path)?;
        let preferences = config.preferences().clone();

        let hardware = match options.hardware {
            Some(hardware) => hardware,
            None => HardwareDetector::new().detect(),
        };

        let mut catalog = ModelCatalog::new(hardware, preferences.clone());
        let last_scan = catalog.scan(&options.models_dir)?;
        let selector = AdaptiveSelector::new(preferences, &options.models_dir);

        info!(
            "Model orchestrator ready with {} model(s) from {:?}",
            catalog.len(),
            options.models_dir
        );

        Ok(Self {
            config,
            models_dir: options.models_dir,
            catalog,
            selector,
            last_scan,
        })
    }

    /// Creates an orchestrator with the default paths and detected hardware
    pub fn with_defaults() -> Result<Self> {
        Self::new(OrchestratorOptions::default())
    }

    /// Current preferences
    pub fn preferences(&self) -> &SelectionPreferences {
        self.config.preferences()
    }

    /// Path of the preferences file
    pub fn config_path(&self) -> &Path {
        self.config.path()
    }

    /// Directory scanned for model artifacts
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Hardware in use
    pub fn hardware(&self) -> &HardwareSnapshot {
        self.catalog.hardware()
    }

    /// Model catalog
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Adaptive selector
    pub fn selector(&self) -> &AdaptiveSelector {
        &self.selector
    }

    /// Outcome of the latest scan
    pub fn last_scan(&self) -> &ScanReport {
        &self.last_scan
    }

    /// Overview of the machine and the catalog
    pub fn system_status(&self) -> SystemStatus {
        let preferences = self.preferences();
        SystemStatus {
            hardware: self.hardware().clone(),
            available_models: self.catalog.len(),
            total_cache_size: self.selector.footprint(),
            performance_mode: preferences.performance_mode,
            memory_usage_percent: preferences.max_memory_usage * 100.0,
            adaptive_selection: preferences.enable_adaptive_selection,
        }
    }

    /// Memory and storage accounting
    pub fn resource_usage(&self) -> ResourceUsage {
        let preferences = self.preferences();
        let hardware = self.hardware();

        let mut active_devices: Vec<String> = preferences
            .preferred_devices
            .iter()
            .filter(|device| is_device_present(hardware, device))
            .cloned()
            .collect();
        if !active_devices.iter().any(|device| device == "cpu") {
            active_devices.push("cpu".to_string());
        }

        ResourceUsage {
            total_memory: hardware.total_memory(),
            used_by_models: self.catalog.total_minimum_ram(),
            available_memory: preferences.memory_budget(hardware.total_memory()) as u64,
            cache_size: self.selector.footprint(),
            cache_threshold: preferences.cleanup_threshold_bytes(),
            model_count: self.catalog.len(),
            active_devices,
        }
    }

    /// Best `top_k` models for `requirements`, highest score first
    ///
    /// Returns an empty list when no model qualifies.
    pub fn get_model_recommendations(
        &self,
        requirements: &TaskRequirements,
        top_k: usize,
    ) -> Vec<ModelRecommendation> {
        let candidates = self.catalog.filter_candidates(requirements);

        let ranked = if self.preferences().enable_adaptive_selection {
            self.selector.recommend(&candidates, top_k)
        } else {
            let mut ranked = self.catalog.rank(&candidates, requirements);
            ranked.truncate(top_k);
            ranked
        };

        debug!(
            "{} candidate(s) for {:?}, returning {}",
            candidates.len(),
            requirements,
            ranked.len()
        );

        ranked
            .into_iter()
            .map(|(model, score)| ModelRecommendation {
                model: model.clone(),
                score,
                hardware: self.catalog.recommend_hardware(model),
            })
            .collect()
    }

    /// Single best model for `requirements`
    ///
    /// Fails with [`Error::NoCandidates`] if no model qualifies.
    pub fn optimize_model_selection(&self, requirements: &TaskRequirements) -> Result<ModelRecommendation> {
        let best = self
            .get_model_recommendations(requirements, 1)
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::NoCandidates(format!(
                    "{} model(s) checked against {:?}",
                    self.catalog.len(),
                    requirements
                ))
            })?;

        info!("Selected model '{}' (score {:.4})", best.model.name, best.score);

        Ok(best)
    }

    /// Records the outcome of running a model
    ///
    /// Statistics are updated first, then the history. Fails with
    /// [`Error::NotFound`] if the model is not cataloged.
    pub fn record_execution_metrics(&mut self, model_name: &str, report: ExecutionReport) -> Result<&UsageStats> {
        if self.catalog.get(model_name).is_none() {
            return Err(Error::NotFound(format!("Model '{}'", model_name)));
        }

        let stats = self.selector.update_stats(model_name, &report);
        self.catalog
            .record_performance(model_name, PerformanceSample::from_report(&report));

        debug!("Recorded execution of '{}' ({} use(s))", model_name, stats.total_uses);

        Ok(stats)
    }

    /// Evicts least recently used models while storage exceeds its budget
    ///
    /// Evicted models are removed from the catalog too.
    pub fn cleanup_resources(&mut self) -> Result<CleanupReport> {
        let report = self.selector.cleanup_cache()?;
        for name in &report.evicted {
            self.catalog.remove(name);
        }
        Ok(report)
    }

    /// Everything known about one model
    ///
    /// Fails with [`Error::NotFound`] if the model is not cataloged.
    pub fn model_performance(&self, model_name: &str) -> Result<ModelPerformanceReport> {
        let model = self
            .catalog
            .get(model_name)
            .ok_or_else(|| Error::NotFound(format!("Model '{}'", model_name)))?;

        Ok(ModelPerformanceReport {
            model: model.clone(),
            usage_stats: self.selector.stats(model_name).cloned(),
            performance_history: self
                .catalog
                .history()
                .get(model_name)
                .map(|samples| samples.iter().cloned().collect())
                .unwrap_or_default(),
            hardware: self.catalog.recommend_hardware(model),
        })
    }

    /// Applies and persists a partial preferences update
    pub fn update_preferences(&mut self, update: PreferencesUpdate) -> Result<&SelectionPreferences> {
        self.config.update(update)?;
        self.propagate_preferences();
        Ok(self.config.preferences())
    }

    /// Sets and persists the score multiplier of one model
    pub fn set_custom_model_weight(&mut self, model_name: &str, weight: f64) -> Result<()> {
        self.config.set_custom_model_weight(model_name, weight)?;
        self.propagate_preferences();
        Ok(())
    }

    /// Removes the score multiplier of one model
    ///
    /// Returns true if a multiplier was set.
    pub fn remove_custom_model_weight(&mut self, model_name: &str) -> Result<bool> {
        let removed = self.config.remove_custom_model_weight(model_name)?;
        self.propagate_preferences();
        Ok(removed)
    }

    /// Restores and persists the default preferences
    pub fn reset_preferences(&mut self) -> Result<&SelectionPreferences> {
        self.config.reset_to_defaults()?;
        self.propagate_preferences();
        Ok(self.config.preferences())
    }

    /// Rescans the models directory
    pub fn rescan(&mut self) -> Result<&ScanReport> {
        self.last_scan = self.catalog.scan(&self.models_dir)?;
        Ok(&self.last_scan)
    }

    /// Re-detects the hardware and rescans
    pub fn refresh_hardware(&mut self) -> Result<&ScanReport> {
        let hardware = HardwareDetector::new().detect();
        self.set_hardware(hardware)
    }

    /// Plans for the given hardware from now on and rescans
    pub fn set_hardware(&mut self, hardware: HardwareSnapshot) -> Result<&ScanReport> {
        self.catalog.set_hardware(hardware);
        self.rescan()
    }

    fn propagate_preferences(&mut self) {
        let preferences = self.config.preferences().clone();
        self.catalog.set_preferences(preferences.clone());
        self.selector.set_preferences(preferences);
    }
}

/// Returns true if a preferred device names hardware that exists here
fn is_device_present(hardware: &HardwareSnapshot, device: &str) -> bool {
    if device == "cpu" || hardware.accelerators().contains_key(device) {
        return true;
    }
    // A bare kind such as "cuda" matches any device of that kind
    !device.contains(':')
        && device
            .parse::<HardwareType>()
            .map(|kind| hardware.accelerator_kinds().contains(&kind))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::AccuracyPreference;
    use hardware_profiler::AcceleratorDevice;
    use std::fs;
    use tempfile::TempDir;

    const GIB: u64 = 1024 * 1024 * 1024;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let preferences = SelectionPreferences {
                cache_dir: dir.path().join("cache"),
                ..Default::default()
            };
            ConfigManager::with_preferences(dir.path().join("config.json"), preferences)
                .save()
                .unwrap();
            Self { dir }
        }

        fn models_dir(&self) -> PathBuf {
            self.dir.path().join("models")
        }

        fn add_model(&self, file_name: &str, len: usize) {
            fs::create_dir_all(self.models_dir()).unwrap();
            fs::write(self.models_dir().join(file_name), vec![0u8; len]).unwrap();
        }

        fn options(&self, hardware: HardwareSnapshot) -> OrchestratorOptions {
            OrchestratorOptions::default()
                .with_config_path(self.dir.path().join("config.json"))
                .with_models_dir(self.models_dir())
                .with_hardware(hardware)
        }

        fn orchestrator(&self) -> ModelOrchestrator {
            ModelOrchestrator::new(self.options(cpu_hardware())).unwrap()
        }
    }

    fn cpu_hardware() -> HardwareSnapshot {
        HardwareSnapshot::new("x86_64", 8, 16, 16 * GIB)
    }

    fn gpu_hardware() -> HardwareSnapshot {
        cpu_hardware().with_accelerator(
            "cuda:0",
            AcceleratorDevice {
                name: "gpu".to_string(),
                compute_capability: "8.6".to_string(),
                total_memory: 8 * GIB,
                parallel_units: 0,
            },
        )
    }

    #[test]
    fn test_new_scans_models() {
        let fixture = Fixture::new();
        fixture.add_model("phi.Q4_0.gguf", 64);
        fixture.add_model("bert.pt", 32);

        let orchestrator = fixture.orchestrator();
        assert_eq!(orchestrator.catalog().len(), 2);
        assert_eq!(orchestrator.last_scan().registered, 2);

        let status = orchestrator.system_status();
        assert_eq!(status.available_models, 2);
        assert_eq!(status.total_cache_size, 96);
        assert_eq!(status.performance_mode, PerformanceMode::Balanced);
        assert!((status.memory_usage_percent - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_new_creates_models_dir() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator();
        assert!(fixture.models_dir().is_dir());
        assert!(orchestrator.catalog().is_empty());
    }

    #[test]
    fn test_invalid_preferences_file_is_fatal() {
        let fixture = Fixture::new();
        fs::write(
            fixture.dir.path().join("config.json"),
            r#"{"performance_mode": "turbo"}"#,
        )
        .unwrap();

        let err = ModelOrchestrator::new(fixture.options(cpu_hardware())).unwrap_err();
        assert!(err.is_invalid_preference());
    }

    #[test]
    fn test_recommendations_cold_start() {
        let fixture = Fixture::new();
        fixture.add_model("a.gguf", 10);
        fixture.add_model("b.gguf", 10);
        fixture.add_model("c.gguf", 10);
        fixture.add_model("d.gguf", 10);

        let orchestrator = fixture.orchestrator();
        let recommendations = orchestrator.get_model_recommendations(&TaskRequirements::default(), 3);

        let names: Vec<_> = recommendations.iter().map(|r| r.model.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(recommendations.iter().all(|r| r.score == 0.5));
        assert!(recommendations.iter().all(|r| r.hardware.preferred_device == "cpu"));
    }

    #[test]
    fn test_feedback_changes_ranking() {
        let fixture = Fixture::new();
        fixture.add_model("a.gguf", 10);
        fixture.add_model("b.gguf", 10);

        let mut orchestrator = fixture.orchestrator();
        orchestrator
            .record_execution_metrics("b", ExecutionReport::new(true, 0.1, 800.0, 0.9))
            .unwrap();

        let best = orchestrator.optimize_model_selection(&TaskRequirements::default()).unwrap();
        assert_eq!(best.model.name, "b");

        let report = orchestrator.model_performance("b").unwrap();
        assert_eq!(report.usage_stats.unwrap().total_uses, 1);
        assert_eq!(report.performance_history.len(), 1);
        assert!(report.hardware.expected_performance.is_some());

        // Selection alone does not touch statistics
        assert!(orchestrator.selector().stats("a").is_none());
    }

    #[test]
    fn test_record_unknown_model_fails() {
        let fixture = Fixture::new();
        let mut orchestrator = fixture.orchestrator();

        let err = orchestrator
            .record_execution_metrics("ghost", ExecutionReport::new(true, 1.0, 1.0, 1.0))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(orchestrator.model_performance("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_no_candidates() {
        let fixture = Fixture::new();
        fixture.add_model("a.gguf", 10);

        let orchestrator = fixture.orchestrator();
        let requirements = TaskRequirements::new().with_batching(true);
        assert!(orchestrator.get_model_recommendations(&requirements, 3).is_empty());
        assert!(orchestrator
            .optimize_model_selection(&requirements)
            .unwrap_err()
            .is_no_candidates());
    }

    #[test]
    fn test_static_ranking_when_adaptive_disabled() {
        let fixture = Fixture::new();
        fixture.add_model("cpu-only.gguf", 10);
        fixture.add_model("gpu-ready.pt", 10);

        let mut orchestrator = ModelOrchestrator::new(fixture.options(gpu_hardware())).unwrap();
        orchestrator
            .update_preferences(PreferencesUpdate {
                enable_adaptive_selection: Some(false),
                ..Default::default()
            })
            .unwrap();

        let recommendations = orchestrator.get_model_recommendations(&TaskRequirements::default(), 3);
        assert_eq!(recommendations[0].model.name, "gpu-ready");
        assert!((recommendations[0].score - 0.2).abs() < 1e-9);
        assert_eq!(recommendations[1].score, 0.0);
    }

    #[test]
    fn test_update_preferences_propagates_and_persists() {
        let fixture = Fixture::new();
        fixture.add_model("llama.Q4_K_M.gguf", 10);
        let mut orchestrator = fixture.orchestrator();

        orchestrator
            .record_execution_metrics("llama.Q4_K_M", ExecutionReport::new(true, 1.0, 500.0, 0.5))
            .unwrap();
        let medium = orchestrator.get_model_recommendations(&TaskRequirements::default(), 1)[0].score;

        orchestrator
            .update_preferences(PreferencesUpdate {
                accuracy_preference: Some(AccuracyPreference::High),
                max_memory_usage: Some(2.0),
                ..Default::default()
            })
            .unwrap();
        let high = orchestrator.get_model_recommendations(&TaskRequirements::default(), 1)[0].score;

        assert!((high - medium * 0.8).abs() < 1e-12);
        assert_eq!(orchestrator.preferences().max_memory_usage, 0.9);

        let reloaded = ConfigManager::load(orchestrator.config_path()).unwrap();
        assert_eq!(reloaded.preferences().accuracy_preference, AccuracyPreference::High);
    }

    #[test]
    fn test_reset_preferences() {
        let fixture = Fixture::new();
        let mut orchestrator = fixture.orchestrator();
        orchestrator
            .update_preferences(PreferencesUpdate {
                performance_mode: Some(PerformanceMode::Speed),
                ..Default::default()
            })
            .unwrap();

        let preferences = orchestrator.reset_preferences().unwrap();
        assert_eq!(preferences, &SelectionPreferences::default());
        assert_eq!(orchestrator.catalog().preferences(), &SelectionPreferences::default());
    }

    #[test]
    fn test_custom_weight() {
        let fixture = Fixture::new();
        fixture.add_model("a.gguf", 10);
        fixture.add_model("b.gguf", 10);
        let mut orchestrator = fixture.orchestrator();

        orchestrator.set_custom_model_weight("b", 3.0).unwrap();
        let recommendations = orchestrator.get_model_recommendations(&TaskRequirements::default(), 2);
        assert_eq!(recommendations[0].model.name, "b");
        assert_eq!(recommendations[0].score, 1.5);
        assert_eq!(recommendations[1].score, 0.5);

        assert!(orchestrator.remove_custom_model_weight("b").unwrap());
        let recommendations = orchestrator.get_model_recommendations(&TaskRequirements::default(), 2);
        assert_eq!(recommendations[0].model.name, "a");
        assert_eq!(recommendations[0].score, 0.5);
    }

    #[test]
    fn test_cleanup_removes_evicted_models_from_catalog() {
        let fixture = Fixture::new();
        fixture.add_model("old.gguf", 600);
        fixture.add_model("new.gguf", 600);
        let mut orchestrator = fixture.orchestrator();

        orchestrator
            .record_execution_metrics("old", ExecutionReport::new(true, 1.0, 1.0, 1.0))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        orchestrator
            .record_execution_metrics("new", ExecutionReport::new(true, 1.0, 1.0, 1.0))
            .unwrap();
        orchestrator
            .update_preferences(PreferencesUpdate {
                auto_cleanup_threshold: Some(1000.0 / GIB as f64),
                ..Default::default()
            })
            .unwrap();

        let report = orchestrator.cleanup_resources().unwrap();
        assert_eq!(report.evicted, vec!["old"]);
        assert!(report.footprint_after <= report.threshold_bytes);
        assert!(orchestrator.catalog().get("old").is_none());
        assert!(orchestrator.catalog().get("new").is_some());
    }

    #[test]
    fn test_resource_usage() {
        let fixture = Fixture::new();
        fixture.add_model("a.gguf", 100);
        let mut orchestrator = ModelOrchestrator::new(fixture.options(gpu_hardware())).unwrap();
        orchestrator
            .update_preferences(PreferencesUpdate {
                preferred_devices: Some(vec!["cuda".to_string(), "rocm".to_string()]),
                ..Default::default()
            })
            .unwrap();

        let usage = orchestrator.resource_usage();
        assert_eq!(usage.total_memory, 16 * GIB);
        assert_eq!(usage.used_by_models, 200);
        assert_eq!(usage.cache_size, 100);
        assert_eq!(usage.cache_threshold, 10 * GIB);
        assert_eq!(usage.model_count, 1);
        assert_eq!(usage.active_devices, vec!["cuda".to_string(), "cpu".to_string()]);
    }

    #[test]
    fn test_set_hardware_rescans() {
        let fixture = Fixture::new();
        fixture.add_model("bert.pt", 10);
        let mut orchestrator = fixture.orchestrator();
        assert_eq!(
            orchestrator.catalog().get("bert").unwrap().preferred_hardware,
            vec![HardwareType::Cpu]
        );

        orchestrator.set_hardware(gpu_hardware()).unwrap();
        assert_eq!(
            orchestrator.catalog().get("bert").unwrap().preferred_hardware,
            vec![HardwareType::Cpu, HardwareType::Cuda]
        );
    }

    #[test]
    fn test_rescan_picks_up_new_files() {
        let fixture = Fixture::new();
        let mut orchestrator = fixture.orchestrator();
        assert!(orchestrator.catalog().is_empty());

        fixture.add_model("late.gguf", 10);
        let report = orchestrator.rescan().unwrap();
        assert_eq!(report.registered, 1);
        assert!(orchestrator.catalog().get("late").is_some());
    }
}
