//! Hardware recommendations
//!
//! Picks a device and a batch size for one model on the current hardware,
//! within the memory share the preferences allow.

use serde::{Deserialize, Serialize};

use common::models::ModelArtifactMetadata;
use common::utils::format_bytes;
use config::SelectionPreferences;
use hardware_profiler::HardwareSnapshot;

use crate::history::HistoryAverages;

/// Device id used when no accelerator is chosen
pub const CPU_DEVICE: &str = "cpu";

/// Share of usable memory spent on batches when running on an accelerator
const ACCELERATOR_BATCH_FACTOR: f64 = 0.7;

/// Share of usable memory spent on batches when running on the CPU
const CPU_BATCH_FACTOR: f64 = 0.5;

/// Fraction of the memory budget above which a model is flagged
const MEMORY_WARNING_RATIO: f64 = 0.8;

/// Performance observed so far for a model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedPerformance {
    /// Mean latency in milliseconds
    pub avg_latency_ms: f64,

    /// Mean throughput
    pub avg_throughput: f64,

    /// Number of samples the means are based on
    pub samples: usize,
}

impl From<HistoryAverages> for ExpectedPerformance {
    fn from(averages: HistoryAverages) -> Self {
        Self {
            avg_latency_ms: averages.latency * 1000.0,
            avg_throughput: averages.throughput,
            samples: averages.samples,
        }
    }
}

/// How to run one model on this machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareRecommendation {
    /// Device id (`cpu` or an accelerator id such as `cuda:0`)
    pub preferred_device: String,

    /// Memory the model needs, in bytes
    pub minimum_memory: u64,

    /// Memory the preferences allow, in bytes
    pub memory_budget: u64,

    /// Suggested batch size; absent for models that do not batch
    pub recommended_batch_size: Option<u64>,

    /// Means over recorded executions, if any
    pub expected_performance: Option<ExpectedPerformance>,

    /// Human-readable warnings
    pub warnings: Vec<String>,
}

/// Builds the recommendation for `model`
pub(crate) fn recommend(
    model: &ModelArtifactMetadata,
    hardware: &HardwareSnapshot,
    preferences: &SelectionPreferences,
    averages: Option<HistoryAverages>,
) -> HardwareRecommendation {
    let memory_budget = preferences.memory_budget(hardware.total_memory());
    let minimum_ram = model.minimum_ram.max(1) as f64;

    // Any overlap between the preferred devices and the model's hardware tags
    // selects the largest accelerator, when one exists
    let wants_accelerator = preferences
        .preferred_hardware()
        .iter()
        .any(|hw| model.prefers(*hw));

    let (preferred_device, usable_memory, batch_factor) = match hardware.largest_accelerator() {
        Some((device_id, device)) if wants_accelerator => (
            device_id.to_string(),
            memory_budget.min(device.total_memory as f64),
            ACCELERATOR_BATCH_FACTOR,
        ),
        _ => (CPU_DEVICE.to_string(), memory_budget, CPU_BATCH_FACTOR),
    };

    let recommended_batch_size = model
        .supports_batching
        .then(|| ((batch_factor * usable_memory / minimum_ram).floor() as u64).max(1));

    let mut warnings = Vec::new();

    // Check memory headroom
    if model.minimum_ram as f64 > MEMORY_WARNING_RATIO * memory_budget {
        warnings.push(format!(
            "Model '{}' needs {} which exceeds {:.0}% of the {} memory budget",
            model.name,
            format_bytes(model.minimum_ram),
            MEMORY_WARNING_RATIO * 100.0,
            format_bytes(memory_budget as u64)
        ));
    }

    // Check accelerator availability
    if model.format.favors_accelerators() && !hardware.has_accelerators() {
        warnings.push(format!(
            "{} model '{}' may run slowly without an accelerator",
            model.format, model.name
        ));
    }

    HardwareRecommendation {
        preferred_device,
        minimum_memory: model.minimum_ram,
        memory_budget: memory_budget as u64,
        recommended_batch_size,
        expected_performance: averages.map(ExpectedPerformance::from),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{HardwareType, ModelFormat};
    use hardware_profiler::AcceleratorDevice;
    use std::path::PathBuf;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn model(minimum_ram: u64, format: ModelFormat, batching: bool) -> ModelArtifactMetadata {
        ModelArtifactMetadata {
            name: "m".to_string(),
            format,
            path: PathBuf::from("m"),
            size_bytes: minimum_ram / 2,
            minimum_ram,
            preferred_hardware: vec![HardwareType::Cpu, HardwareType::Cuda],
            supports_batching: batching,
            quantization: None,
        }
    }

    fn gpu_hardware(total_gib: u64, gpu_gib: u64) -> HardwareSnapshot {
        HardwareSnapshot::new("x86_64", 8, 16, total_gib * GIB).with_accelerator(
            "cuda:0",
            AcceleratorDevice {
                name: "gpu".to_string(),
                compute_capability: "8.6".to_string(),
                total_memory: gpu_gib * GIB,
                parallel_units: 0,
            },
        )
    }

    fn cuda_preferences() -> SelectionPreferences {
        SelectionPreferences {
            preferred_devices: vec!["cuda".to_string(), "cpu".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_accelerator_batch_size() {
        // Scenario: 8 GiB device, 3 GB model, device memory below the budget
        let hardware = gpu_hardware(16, 8);
        let model = model(3 * GIB, ModelFormat::PyTorch, true);
        let rec = recommend(&model, &hardware, &cuda_preferences(), None);

        let budget = 0.7 * (16 * GIB) as f64;
        let expected = (0.7 * budget.min((8 * GIB) as f64) / (3 * GIB) as f64).floor() as u64;
        assert_eq!(rec.preferred_device, "cuda:0");
        assert_eq!(rec.recommended_batch_size, Some(expected));
        assert_eq!(expected, 1);
    }

    #[test]
    fn test_accelerator_batch_size_capped_by_device() {
        let hardware = gpu_hardware(64, 24);
        let model = model(3 * GIB, ModelFormat::PyTorch, true);
        let rec = recommend(&model, &hardware, &cuda_preferences(), None);

        assert_eq!(rec.recommended_batch_size, Some(5));
        assert!(rec.warnings.is_empty());
    }

    #[test]
    fn test_default_preferences_use_present_accelerator() {
        // "cpu" is preferred and the model lists cpu, so the GPU is chosen
        let hardware = gpu_hardware(16, 8);
        let model = model(GIB, ModelFormat::PyTorch, true);
        let rec = recommend(&model, &hardware, &SelectionPreferences::default(), None);

        // floor(0.7 * min(11.2 GiB, 8 GiB) / 1 GiB)
        assert_eq!(rec.preferred_device, "cuda:0");
        assert_eq!(rec.recommended_batch_size, Some(5));
    }

    #[test]
    fn test_cpu_fallback_without_tag_overlap() {
        let hardware = gpu_hardware(16, 8);
        let mut model = model(GIB, ModelFormat::PyTorch, true);
        model.preferred_hardware = vec![HardwareType::Cpu];
        let preferences = SelectionPreferences {
            preferred_devices: vec!["rocm".to_string()],
            ..Default::default()
        };
        let rec = recommend(&model, &hardware, &preferences, None);

        // floor(0.5 * 11.2 GiB / 1 GiB)
        assert_eq!(rec.preferred_device, CPU_DEVICE);
        assert_eq!(rec.recommended_batch_size, Some(5));
    }

    #[test]
    fn test_cpu_without_accelerators() {
        let hardware = HardwareSnapshot::new("x86_64", 4, 8, 16 * GIB);
        let model = model(GIB, ModelFormat::PyTorch, true);
        let rec = recommend(&model, &hardware, &cuda_preferences(), None);
        assert_eq!(rec.preferred_device, CPU_DEVICE);
    }

    #[test]
    fn test_no_batch_size_without_batching() {
        let hardware = HardwareSnapshot::new("x86_64", 4, 8, 16 * GIB);
        let model = model(GIB, ModelFormat::Gguf, false);
        let rec = recommend(&model, &hardware, &SelectionPreferences::default(), None);
        assert_eq!(rec.recommended_batch_size, None);
        assert!(rec.warnings.is_empty());
    }

    #[test]
    fn test_batch_size_at_least_one() {
        let hardware = HardwareSnapshot::new("x86_64", 4, 8, 16 * GIB);
        let model = model(15 * GIB, ModelFormat::PyTorch, true);
        let rec = recommend(&model, &hardware, &SelectionPreferences::default(), None);
        assert_eq!(rec.recommended_batch_size, Some(1));
    }

    #[test]
    fn test_warnings() {
        let hardware = HardwareSnapshot::new("x86_64", 4, 8, 16 * GIB);
        let model = model(10 * GIB, ModelFormat::PyTorch, true);
        let rec = recommend(&model, &hardware, &SelectionPreferences::default(), None);

        // 10 GiB > 0.8 * 11.2 GiB, and no accelerator for a PyTorch model
        assert_eq!(rec.warnings.len(), 2);
    }

    #[test]
    fn test_expected_performance() {
        let hardware = HardwareSnapshot::new("x86_64", 4, 8, 16 * GIB);
        let model = model(GIB, ModelFormat::Gguf, false);
        let averages = HistoryAverages {
            samples: 2,
            latency: 0.25,
            throughput: 40.0,
            memory_efficiency: 0.5,
            success_rate: 1.0,
        };
        let rec = recommend(&model, &hardware, &SelectionPreferences::default(), Some(averages));

        let expected = rec.expected_performance.unwrap();
        assert_eq!(expected.avg_latency_ms, 250.0);
        assert_eq!(expected.avg_throughput, 40.0);
        assert_eq!(expected.samples, 2);
    }
}
