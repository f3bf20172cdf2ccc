//! Usage statistics
//!
//! Running means of every reported execution, per model, and the JSON file
//! they persist to.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::error::Result;
use common::models::ExecutionReport;
use storage_adapter::JsonStore;

/// File name of the statistics document inside the cache directory
pub const STATS_FILE_NAME: &str = "model_stats.json";

/// Running aggregates of a model's executions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Fraction of successful executions
    pub success_rate: f64,

    /// Mean latency in seconds
    pub avg_latency: f64,

    /// Mean throughput
    pub avg_throughput: f64,

    /// Mean memory efficiency
    pub memory_efficiency: f64,

    /// Time of the latest execution
    pub last_used: DateTime<Utc>,

    /// Number of executions
    pub total_uses: u64,
}

impl UsageStats {
    /// Seeds statistics from a first execution
    pub fn from_report(report: &ExecutionReport, now: DateTime<Utc>) -> Self {
        let report = report.sanitized();
        Self {
            success_rate: success_value(report.success),
            avg_latency: report.latency,
            avg_throughput: report.throughput,
            memory_efficiency: report.memory_efficiency,
            last_used: now,
            total_uses: 1,
        }
    }

    /// Folds one more execution into the running means
    pub fn record(&mut self, report: &ExecutionReport, now: DateTime<Utc>) {
        let report = report.sanitized();
        let n = self.total_uses as f64;
        let fold = |avg: f64, value: f64| (avg * n + value) / (n + 1.0);

        self.success_rate = fold(self.success_rate, success_value(report.success));
        self.avg_latency = fold(self.avg_latency, report.latency);
        self.avg_throughput = fold(self.avg_throughput, report.throughput);
        self.memory_efficiency = fold(self.memory_efficiency, report.memory_efficiency);
        self.total_uses += 1;
        self.last_used = now;
    }
}

fn success_value(success: bool) -> f64 {
    if success {
        1.0
    } else {
        0.0
    }
}

/// Persistent home of the usage statistics
#[derive(Debug, Clone)]
pub struct StatsStore {
    store: JsonStore,
}

impl StatsStore {
    /// Store at `<cache_dir>/model_stats.json`
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            store: JsonStore::new(cache_dir.join(STATS_FILE_NAME)),
        }
    }

    /// Path of the statistics file
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Loads the statistics
    ///
    /// A missing, unreadable or malformed file yields an empty map.
    pub fn load(&self) -> BTreeMap<String, UsageStats> {
        match self.store.load() {
            Ok(Some(stats)) => stats,
            Ok(None) => {
                debug!("No statistics at {:?}", self.store.path());
                BTreeMap::new()
            }
            Err(e) => {
                warn!("Ignoring unreadable statistics at {:?}: {}", self.store.path(), e);
                BTreeMap::new()
            }
        }
    }

    /// Writes the statistics atomically
    pub fn save(&self, stats: &BTreeMap<String, UsageStats>) -> Result<()> {
        self.store.save(stats)
    }
}
