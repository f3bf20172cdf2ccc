//! Adaptive model selection
//!
//! The selector learns from reported executions: it keeps running statistics
//! per model, scores candidates from those statistics under the current
//! preferences, and evicts the least recently used artifacts when the
//! artifact directory outgrows its storage budget.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use common::error::Result;
use common::models::{ExecutionReport, ModelArtifactMetadata};
use common::utils::format_bytes;
use config::SelectionPreferences;
use storage_adapter::{directory_size, files_with_stem, remove_file_if_exists};

use crate::metadata::MetadataExtractor;
use crate::stats::{StatsStore, UsageStats};

/// Score of a model that has never been reported on
pub const COLD_START_SCORE: f64 = 0.5;

/// Number of recommendations returned when the caller does not say
pub const DEFAULT_TOP_K: usize = 3;

/// Weight of the success rate, identical in every mode
const SUCCESS_WEIGHT: f64 = 0.2;

/// Throughput is divided by this before weighting
const THROUGHPUT_SCALE: f64 = 1000.0;

/// Eviction stops once the footprint falls to this share of the threshold
const EVICTION_TARGET_RATIO: f64 = 0.8;

/// Outcome of a cache cleanup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Storage budget in bytes (0 when cleanup is disabled)
    pub threshold_bytes: u64,

    /// Artifact footprint before cleanup
    pub footprint_before: u64,

    /// Artifact footprint after cleanup
    pub footprint_after: u64,

    /// Evicted model names, least recently used first
    pub evicted: Vec<String>,
}

impl CleanupReport {
    /// Bytes freed by the cleanup
    pub fn freed_bytes(&self) -> u64 {
        self.footprint_before.saturating_sub(self.footprint_after)
    }
}

/// Learns from execution feedback and scores models accordingly
#[derive(Debug)]
pub struct AdaptiveSelector {
    /// Current preferences
    preferences: SelectionPreferences,

    /// Directory holding the model artifacts
    artifact_root: PathBuf,

    /// Statistics by model name
    stats: BTreeMap<String, UsageStats>,

    /// Where `stats` persists
    store: StatsStore,
}

impl AdaptiveSelector {
    /// Creates a selector, loading any statistics saved in the cache directory
    pub fn new(preferences: SelectionPreferences, artifact_root: impl Into<PathBuf>) -> Self {
        let store = StatsStore::new(&preferences.cache_dir);
        let stats = store.load();

        debug!("Loaded statistics for {} model(s) from {:?}", stats.len(), store.path());

        Self {
            preferences,
            artifact_root: artifact_root.into(),
            stats,
            store,
        }
    }

    /// Preferences in use
    pub fn preferences(&self) -> &SelectionPreferences {
        &self.preferences
    }

    /// Replaces the preferences
    ///
    /// When the cache directory changes, statistics are reloaded from the new
    /// location.
    pub fn set_preferences(&mut self, preferences: SelectionPreferences) {
        if preferences.cache_dir != self.preferences.cache_dir {
            self.store = StatsStore::new(&preferences.cache_dir);
            self.stats = self.store.load();
            info!(
                "Statistics location changed to {:?} ({} model(s) loaded)",
                self.store.path(),
                self.stats.len()
            );
        }
        self.preferences = preferences;
    }

    /// Directory holding the model artifacts
    pub fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    /// Statistics of one model
    pub fn stats(&self, model_name: &str) -> Option<&UsageStats> {
        self.stats.get(model_name)
    }

    /// Statistics of every model, by name
    pub fn all_stats(&self) -> &BTreeMap<String, UsageStats> {
        &self.stats
    }

    /// Score from statistics and preferences, before the custom weight
    pub fn base_score(&self, model: &ModelArtifactMetadata) -> f64 {
        let Some(stats) = self.stats.get(&model.name) else {
            return COLD_START_SCORE;
        };

        let weights = self.preferences.performance_mode.weights();
        let mut score = weights.latency / (1.0 + stats.avg_latency)
            + weights.throughput * (stats.avg_throughput / THROUGHPUT_SCALE)
            + weights.memory * stats.memory_efficiency
            + SUCCESS_WEIGHT * stats.success_rate;

        if model.is_heavily_quantized() {
            score *= self.preferences.accuracy_preference.quantization_multiplier();
        }

        score
    }

    /// Final score of one model
    pub fn score(&self, model: &ModelArtifactMetadata) -> f64 {
        self.base_score(model) * self.preferences.custom_weight(&model.name)
    }

    /// Folds an execution report into a model's statistics and persists them
    ///
    /// A persistence failure is logged; the in-memory statistics are updated
    /// regardless.
    pub fn update_stats(&mut self, model_name: &str, report: &ExecutionReport) -> &UsageStats {
        let now = Utc::now();
        self.stats
            .entry(model_name.to_string())
            .and_modify(|stats| stats.record(report, now))
            .or_insert_with(|| UsageStats::from_report(report, now));

        if let Err(e) = self.store.save(&self.stats) {
            warn!("Failed to persist statistics to {:?}: {}", self.store.path(), e);
        }

        &self.stats[model_name]
    }

    /// Scores candidates and returns the best `top_k`, highest first
    ///
    /// Ties keep the candidates' input order.
    pub fn recommend<'a>(
        &self,
        candidates: &[&'a ModelArtifactMetadata],
        top_k: usize,
    ) -> Vec<(&'a ModelArtifactMetadata, f64)> {
        let mut scored: Vec<_> = candidates
            .iter()
            .map(|&model| (model, self.score(model)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        scored
    }

    /// Total size of the model artifacts under the artifact directory
    ///
    /// Files with an unrecognised extension are not counted.
    pub fn footprint(&self) -> u64 {
        directory_size(&self.artifact_root, is_artifact)
    }

    /// Evicts least recently used models until the footprint fits the budget
    ///
    /// Only models with statistics are eviction candidates. Eviction stops
    /// once the footprint is at most 80% of the threshold.
    pub fn cleanup_cache(&mut self) -> Result<CleanupReport> {
        let threshold = self.preferences.cleanup_threshold_bytes();
        let footprint = self.footprint();

        let mut report = CleanupReport {
            threshold_bytes: threshold,
            footprint_before: footprint,
            footprint_after: footprint,
            evicted: Vec::new(),
        };

        if threshold == 0 {
            debug!("Cache cleanup disabled");
            return Ok(report);
        }

        if footprint <= threshold {
            debug!(
                "Artifact footprint {} within threshold {}",
                format_bytes(footprint),
                format_bytes(threshold)
            );
            return Ok(report);
        }

        let target = (threshold as f64 * EVICTION_TARGET_RATIO) as u64;
        let mut candidates: Vec<(String, _)> = self
            .stats
            .iter()
            .map(|(name, stats)| (name.clone(), stats.last_used))
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut remaining = footprint;
        for (name, _) in candidates {
            if remaining <= target {
                break;
            }

            match self.evict(&name) {
                Ok(freed) => {
                    remaining = remaining.saturating_sub(freed);
                    self.stats.remove(&name);
                    info!("Evicted model '{}' ({} freed)", name, format_bytes(freed));
                    report.evicted.push(name);
                }
                Err(e) => warn!("Failed to evict model '{}': {}", name, e),
            }
        }

        report.footprint_after = remaining;

        if !report.evicted.is_empty() {
            if let Err(e) = self.store.save(&self.stats) {
                warn!("Failed to persist statistics to {:?}: {}", self.store.path(), e);
            }
        }

        info!(
            "Cache cleanup evicted {} model(s): {} -> {}",
            report.evicted.len(),
            format_bytes(report.footprint_before),
            format_bytes(report.footprint_after)
        );

        Ok(report)
    }

    /// Deletes every artifact of one model, returning the bytes freed
    ///
    /// Files sharing the model's stem but not recognised as model artifacts
    /// are left alone.
    fn evict(&self, model_name: &str) -> Result<u64> {
        let mut freed = 0;
        for (path, size) in files_with_stem(&self.artifact_root, model_name, is_artifact) {
            if remove_file_if_exists(&path)? {
                freed += size;
            } else {
                warn!("Artifact {:?} already removed", path);
            }
        }
        Ok(freed)
    }
}

fn is_artifact(path: &Path) -> bool {
    MetadataExtractor::classify(path).is_some()
}
