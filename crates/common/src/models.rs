//! Common data models for Model Orchestrator
//!
//! This module defines the value objects exchanged between the catalog, the
//! selector and their callers.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use chrono::{DateTime, Utc};

use crate::types::{HardwareType, ModelFormat, Quantization};

/// Catalog record describing one discovered model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifactMetadata {
    /// Unique model name (catalog key)
    pub name: String,
    /// Artifact format
    pub format: ModelFormat,
    /// Location of the artifact on disk
    pub path: PathBuf,
    /// Artifact size in bytes
    pub size_bytes: u64,
    /// Estimated minimum resident memory in bytes, always > 0
    pub minimum_ram: u64,
    /// Hardware the model runs best on
    pub preferred_hardware: Vec<HardwareType>,
    /// Whether the model accepts batched input
    pub supports_batching: bool,
    /// Quantization tag parsed from the file name
    pub quantization: Option<Quantization>,
}

impl ModelArtifactMetadata {
    /// Returns true if the model lists the given hardware tag
    pub fn prefers(&self, hardware: HardwareType) -> bool {
        self.preferred_hardware.contains(&hardware)
    }

    /// Returns true if the model carries a 4-bit quantization tag
    pub fn is_heavily_quantized(&self) -> bool {
        self.quantization.map_or(false, |q| q.is_heavily_quantized())
    }
}

/// Sparse task requirements; every absent field is a pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRequirements {
    /// At least one of these tags must be preferred by the model
    pub required_hardware: Option<Vec<HardwareType>>,
    /// Upper bound on the quantization level (e.g. 5 admits Q4 and Q5)
    pub max_quantization: Option<u32>,
    /// Model must support batching when true
    pub requires_batching: Option<bool>,
    /// Upper bound on the artifact size
    pub max_size_bytes: Option<u64>,
}

impl TaskRequirements {
    /// Requirements with no constraints
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires one of the given hardware tags
    pub fn with_required_hardware(mut self, hardware: Vec<HardwareType>) -> Self {
        self.required_hardware = Some(hardware);
        self
    }

    /// Caps the quantization level
    pub fn with_max_quantization(mut self, level: u32) -> Self {
        self.max_quantization = Some(level);
        self
    }

    /// Sets the batching requirement
    pub fn with_batching(mut self, required: bool) -> Self {
        self.requires_batching = Some(required);
        self
    }

    /// Caps the artifact size
    pub fn with_max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = Some(bytes);
        self
    }
}

/// Metrics reported by the caller after executing a model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Whether the execution succeeded
    pub success: bool,
    /// Latency in seconds
    pub latency: f64,
    /// Throughput (tokens per second)
    pub throughput: f64,
    /// Memory efficiency in [0, 1]
    pub memory_efficiency: f64,
}

impl ExecutionReport {
    /// Creates a report
    pub fn new(success: bool, latency: f64, throughput: f64, memory_efficiency: f64) -> Self {
        Self { success, latency, throughput, memory_efficiency }
    }

    /// Returns a copy with every field forced into its valid domain
    pub fn sanitized(&self) -> Self {
        fn non_negative(value: f64) -> f64 {
            if value.is_finite() { value.max(0.0) } else { 0.0 }
        }

        Self {
            success: self.success,
            latency: non_negative(self.latency),
            throughput: non_negative(self.throughput),
            memory_efficiency: non_negative(self.memory_efficiency).min(1.0),
        }
    }
}

/// One raw execution sample kept in a model's performance history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    /// Latency in seconds
    pub latency: f64,
    /// Throughput (tokens per second)
    pub throughput: f64,
    /// Memory efficiency in [0, 1]
    pub memory_efficiency: f64,
    /// Whether the execution succeeded
    pub success: bool,
    /// When the sample was recorded
    pub recorded_at: DateTime<Utc>,
}

impl PerformanceSample {
    /// Builds a sample from an execution report, stamped now
    pub fn from_report(report: &ExecutionReport) -> Self {
        let report = report.sanitized();
        Self {
            latency: report.latency,
            throughput: report.throughput,
            memory_efficiency: report.memory_efficiency,
            success: report.success,
            recorded_at: Utc::now(),
        }
    }
}

impl From<ExecutionReport> for PerformanceSample {
    fn from(report: ExecutionReport) -> Self {
        Self::from_report(&report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirements_deserialize_sparse() {
        let req: TaskRequirements = serde_json::from_str(r#"{"max_size_bytes": 2000000}"#).unwrap();
        assert_eq!(req, TaskRequirements::new().with_max_size_bytes(2_000_000));
        assert!(req.required_hardware.is_none());

        let req: TaskRequirements =
            serde_json::from_str(r#"{"required_hardware": ["cuda"], "requires_batching": true}"#).unwrap();
        assert_eq!(req.required_hardware, Some(vec![HardwareType::Cuda]));
        assert_eq!(req.requires_batching, Some(true));
    }

    #[test]
    fn test_report_sanitized() {
        let report = ExecutionReport::new(true, -1.0, f64::NAN, 1.5).sanitized();
        assert_eq!(report.latency, 0.0);
        assert_eq!(report.throughput, 0.0);
        assert_eq!(report.memory_efficiency, 1.0);
    }

    #[test]
    fn test_heavily_quantized() {
        let mut model = ModelArtifactMetadata {
            name: "m".to_string(),
            format: ModelFormat::Gguf,
            path: PathBuf::from("m.gguf"),
            size_bytes: 10,
            minimum_ram: 20,
            preferred_hardware: vec![HardwareType::Cpu],
            supports_batching: false,
            quantization: Some(Quantization::Q4_0),
        };
        assert!(model.is_heavily_quantized());
        assert!(model.prefers(HardwareType::Cpu));
        model.quantization = Some(Quantization::Q8_0);
        assert!(!model.is_heavily_quantized());
        model.quantization = None;
        assert!(!model.is_heavily_quantized());
    }
}
