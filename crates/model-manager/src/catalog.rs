//! Model catalog
//!
//! The catalog owns the discovered artifacts, filters them against a task's
//! requirements, ranks the survivors and keeps a bounded execution history
//! per model.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use common::error::{Error, Result};
use common::models::{ModelArtifactMetadata, PerformanceSample, TaskRequirements};
use config::SelectionPreferences;
use hardware_profiler::HardwareSnapshot;

use crate::history::{HistoryAverages, PerformanceHistory};
use crate::metadata::MetadataExtractor;
use crate::recommendations::{self, HardwareRecommendation};

/// Weight of the inverse mean latency in the static rank
const LATENCY_WEIGHT: f64 = 0.4;

/// Weight of the mean throughput in the static rank
const THROUGHPUT_WEIGHT: f64 = 0.3;

/// Weight per matching accelerator kind in the static rank
const HARDWARE_MATCH_WEIGHT: f64 = 0.2;

/// Weight of the size headroom in the static rank
const SIZE_WEIGHT: f64 = 0.1;

/// A file that could not be registered during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanIssue {
    /// Offending path
    pub path: PathBuf,

    /// Why the file was skipped
    pub reason: String,
}

/// Outcome of a directory scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Scanned directory
    pub root: PathBuf,

    /// Models registered
    pub registered: usize,

    /// Files ignored because their extension is unknown
    pub ignored: usize,

    /// Files skipped because of an error
    pub issues: Vec<ScanIssue>,
}

impl ScanReport {
    /// Returns true if no file was skipped
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Catalog of the model artifacts available locally
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    /// Hardware the models will run on
    hardware: HardwareSnapshot,

    /// Current preferences
    preferences: SelectionPreferences,

    /// Models in insertion order
    models: Vec<ModelArtifactMetadata>,

    /// Position of each model in `models`, by name
    index: HashMap<String, usize>,

    /// Raw execution samples
    history: PerformanceHistory,
}

impl ModelCatalog {
    /// Creates an empty catalog
    pub fn new(hardware: HardwareSnapshot, preferences: SelectionPreferences) -> Self {
        let history = PerformanceHistory::new(preferences.model_usage_history_size);
        Self {
            hardware,
            preferences,
            models: Vec::new(),
            index: HashMap::new(),
            history,
        }
    }

    /// Hardware snapshot in use
    pub fn hardware(&self) -> &HardwareSnapshot {
        &self.hardware
    }

    /// Replaces the hardware snapshot
    pub fn set_hardware(&mut self, hardware: HardwareSnapshot) {
        self.hardware = hardware;
    }

    /// Preferences in use
    pub fn preferences(&self) -> &SelectionPreferences {
        &self.preferences
    }

    /// Replaces the preferences, resizing the history to the new capacity
    pub fn set_preferences(&mut self, preferences: SelectionPreferences) {
        self.history.set_capacity(preferences.model_usage_history_size);
        self.preferences = preferences;
    }

    /// Registers every model artifact under `root`
    ///
    /// The previous model set is replaced. Files that fail are reported in
    /// the returned [`ScanReport`] and do not abort the scan. A missing root
    /// directory is created.
    pub fn scan(&mut self, root: &Path) -> Result<ScanReport> {
        let mut report = ScanReport {
            root: root.to_path_buf(),
            ..Default::default()
        };

        if !root.exists() {
            fs::create_dir_all(root)?;
            info!("Created models directory {:?}", root);
        }

        let extractor = MetadataExtractor::new(&self.hardware);
        let mut models = Vec::new();
        let mut index = HashMap::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                    warn!("Failed to read {:?}: {}", path, e);
                    report.issues.push(ScanIssue {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            match extractor.extract(entry.path()) {
                Ok(Some(model)) => {
                    if index.contains_key(&model.name) {
                        warn!("Skipping {:?}: model '{}' is already registered", entry.path(), model.name);
                        report.issues.push(ScanIssue {
                            path: entry.path().to_path_buf(),
                            reason: format!("duplicate model name '{}'", model.name),
                        });
                        continue;
                    }
                    index.insert(model.name.clone(), models.len());
                    models.push(model);
                }
                Ok(None) => {
                    debug!("Ignoring {:?}", entry.path());
                    report.ignored += 1;
                }
                Err(e) => {
                    warn!("Failed to register {:?}: {}", entry.path(), e);
                    report.issues.push(ScanIssue {
                        path: entry.path().to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.registered = models.len();
        self.models = models;
        self.index = index;
        let index = &self.index;
        self.history.retain(|name| index.contains_key(name));

        info!(
            "Scanned {:?}: {} model(s), {} ignored, {} issue(s)",
            root,
            report.registered,
            report.ignored,
            report.issues.len()
        );

        Ok(report)
    }

    /// Adds one model
    ///
    /// Fails with [`Error::AlreadyExists`] if the name is taken.
    pub fn insert(&mut self, model: ModelArtifactMetadata) -> Result<()> {
        if self.index.contains_key(&model.name) {
            return Err(Error::AlreadyExists(format!("Model '{}'", model.name)));
        }
        self.index.insert(model.name.clone(), self.models.len());
        self.models.push(model);
        Ok(())
    }

    /// Looks up a model by name
    pub fn get(&self, name: &str) -> Option<&ModelArtifactMetadata> {
        self.index.get(name).map(|&position| &self.models[position])
    }

    /// Every model in insertion order
    pub fn list(&self) -> &[ModelArtifactMetadata] {
        &self.models
    }

    /// Number of models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns true if the catalog holds no model
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Removes a model together with its history
    pub fn remove(&mut self, name: &str) -> Option<ModelArtifactMetadata> {
        let position = self.index.remove(name)?;
        let model = self.models.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        self.history.remove(name);
        Some(model)
    }

    /// Sum of the minimum memory of every model
    pub fn total_minimum_ram(&self) -> u64 {
        self.models.iter().map(|model| model.minimum_ram).fold(0, u64::saturating_add)
    }

    /// Checks whether a model can serve a task on this hardware
    pub fn meets_requirements(&self, model: &ModelArtifactMetadata, requirements: &TaskRequirements) -> bool {
        // Check memory
        if model.minimum_ram > self.hardware.total_memory() {
            return false;
        }

        // Check hardware
        if let Some(required) = &requirements.required_hardware {
            if !required.iter().any(|hw| model.prefers(*hw)) {
                return false;
            }
        }

        // Check quantization
        if let (Some(max_bits), Some(quantization)) = (requirements.max_quantization, model.quantization) {
            if quantization.bits() > max_bits {
                return false;
            }
        }

        // Check batching
        if requirements.requires_batching == Some(true) && !model.supports_batching {
            return false;
        }

        // Check size
        if let Some(max_size) = requirements.max_size_bytes {
            if model.size_bytes > max_size {
                return false;
            }
        }

        true
    }

    /// Models that meet `requirements`, in insertion order
    pub fn filter_candidates(&self, requirements: &TaskRequirements) -> Vec<&ModelArtifactMetadata> {
        self.models
            .iter()
            .filter(|model| self.meets_requirements(model, requirements))
            .collect()
    }

    /// Static score of one model from history, hardware fit and size
    pub fn composite_score(&self, model: &ModelArtifactMetadata, requirements: &TaskRequirements) -> f64 {
        let mut score = 0.0;

        if let Some(averages) = self.history.averages(&model.name) {
            if averages.latency > 0.0 {
                score += LATENCY_WEIGHT / averages.latency;
            }
            score += THROUGHPUT_WEIGHT * averages.throughput;
        }

        let accelerators = self.hardware.accelerator_kinds();
        let matches = model
            .preferred_hardware
            .iter()
            .filter(|hw| accelerators.contains(hw))
            .count();
        score += HARDWARE_MATCH_WEIGHT * matches as f64;

        if let Some(max_size) = requirements.max_size_bytes.filter(|&max| max > 0) {
            score += SIZE_WEIGHT * (1.0 - model.size_bytes as f64 / max_size as f64);
        }

        score
    }

    /// Orders candidates by descending static score; ties keep input order
    pub fn rank<'a>(
        &self,
        candidates: &[&'a ModelArtifactMetadata],
        requirements: &TaskRequirements,
    ) -> Vec<(&'a ModelArtifactMetadata, f64)> {
        let mut ranked: Vec<_> = candidates
            .iter()
            .map(|&model| (model, self.composite_score(model, requirements)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Best model for `requirements`
    ///
    /// Fails with [`Error::NoCandidates`] if no model qualifies.
    pub fn select_model(&self, requirements: &TaskRequirements) -> Result<&ModelArtifactMetadata> {
        let candidates = self.filter_candidates(requirements);
        let (model, score) = self
            .rank(&candidates, requirements)
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::NoCandidates(format!("{} model(s) checked against {:?}", self.models.len(), requirements))
            })?;

        debug!("Selected model '{}' with score {:.4}", model.name, score);

        Ok(model)
    }

    /// Appends an execution sample to a model's history
    pub fn record_performance(&mut self, name: &str, sample: PerformanceSample) {
        self.history.record(name, sample);
    }

    /// Execution history
    pub fn history(&self) -> &PerformanceHistory {
        &self.history
    }

    /// Means over a model's recorded executions
    pub fn history_averages(&self, name: &str) -> Option<HistoryAverages> {
        self.history.averages(name)
    }

    /// Device and batch size suggestion for one model
    pub fn recommend_hardware(&self, model: &ModelArtifactMetadata) -> HardwareRecommendation {
        recommendations::recommend(
            model,
            &self.hardware,
            &self.preferences,
            self.history.averages(&model.name),
        )
    }
}
