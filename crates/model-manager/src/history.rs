//! Per-model performance history
//!
//! Raw execution samples, kept per model name in arrival order. Each model's
//! history is a ring buffer bounded by the configured capacity.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use common::models::PerformanceSample;

/// Means over a model's recorded samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryAverages {
    /// Number of samples averaged
    pub samples: usize,

    /// Mean latency in seconds
    pub latency: f64,

    /// Mean throughput
    pub throughput: f64,

    /// Mean memory efficiency
    pub memory_efficiency: f64,

    /// Fraction of successful executions
    pub success_rate: f64,
}

/// Bounded performance history for every model
#[derive(Debug, Clone, Default)]
pub struct PerformanceHistory {
    /// Samples by model name, oldest first
    samples: HashMap<String, VecDeque<PerformanceSample>>,

    /// Maximum samples kept per model; 0 keeps everything
    capacity: usize,
}

impl PerformanceHistory {
    /// Creates an empty history keeping at most `capacity` samples per model
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: HashMap::new(),
            capacity,
        }
    }

    /// Maximum samples kept per model (0 = unbounded)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the capacity, dropping the oldest samples that no longer fit
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        if capacity == 0 {
            return;
        }
        for samples in self.samples.values_mut() {
            while samples.len() > capacity {
                samples.pop_front();
            }
        }
    }

    /// Appends a sample, creating the model's history if needed
    pub fn record(&mut self, model_name: &str, sample: PerformanceSample) {
        let samples = self.samples.entry(model_name.to_string()).or_default();
        samples.push_back(sample);
        if self.capacity > 0 {
            while samples.len() > self.capacity {
                samples.pop_front();
            }
        }
    }

    /// Samples of one model, oldest first
    pub fn get(&self, model_name: &str) -> Option<&VecDeque<PerformanceSample>> {
        self.samples.get(model_name).filter(|samples| !samples.is_empty())
    }

    /// Means over one model's samples, if it has any
    pub fn averages(&self, model_name: &str) -> Option<HistoryAverages> {
        let samples = self.get(model_name)?;
        let count = samples.len() as f64;

        let (latency, throughput, memory_efficiency, successes) = samples.iter().fold(
            (0.0, 0.0, 0.0, 0.0),
            |(latency, throughput, memory, successes), sample| {
                (
                    latency + sample.latency,
                    throughput + sample.throughput,
                    memory + sample.memory_efficiency,
                    successes + if sample.success { 1.0 } else { 0.0 },
                )
            },
        );

        Some(HistoryAverages {
            samples: samples.len(),
            latency: latency / count,
            throughput: throughput / count,
            memory_efficiency: memory_efficiency / count,
            success_rate: successes / count,
        })
    }

    /// Drops one model's history
    pub fn remove(&mut self, model_name: &str) -> Option<VecDeque<PerformanceSample>> {
        self.samples.remove(model_name)
    }

    /// Keeps only the histories whose model name satisfies `keep`
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.samples.retain(|name, _| keep(name));
    }

    /// Number of models with history
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no model has history
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
