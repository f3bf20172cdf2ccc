//! Common types for Model Orchestrator
//!
//! This module defines the closed vocabularies shared by the catalog, the
//! selector and the preferences layer.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Performance trade-off requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    /// Favor latency and throughput
    Speed,
    /// Favor memory efficiency
    Memory,
    /// Even split between speed and memory
    Balanced,
}

/// Score weights selected by a [`PerformanceMode`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    /// Weight of the latency component
    pub latency: f64,
    /// Weight of the throughput component
    pub throughput: f64,
    /// Weight of the memory efficiency component
    pub memory: f64,
}

impl PerformanceMode {
    /// Returns the weight triple used by the adaptive selector
    pub fn weights(&self) -> ScoreWeights {
        match self {
            PerformanceMode::Speed => ScoreWeights { latency: 0.4, throughput: 0.3, memory: 0.1 },
            PerformanceMode::Memory => ScoreWeights { latency: 0.2, throughput: 0.2, memory: 0.4 },
            PerformanceMode::Balanced => ScoreWeights { latency: 0.3, throughput: 0.3, memory: 0.2 },
        }
    }

    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceMode::Speed => "speed",
            PerformanceMode::Memory => "memory",
            PerformanceMode::Balanced => "balanced",
        }
    }
}

impl Default for PerformanceMode {
    fn default() -> Self {
        PerformanceMode::Balanced
    }
}

impl fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PerformanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "speed" => Ok(PerformanceMode::Speed),
            "memory" => Ok(PerformanceMode::Memory),
            "balanced" => Ok(PerformanceMode::Balanced),
            _ => Err(format!("Unknown performance mode: {}", s)),
        }
    }
}

/// How much the user cares about numeric precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyPreference {
    /// Penalize heavily quantized models
    High,
    /// No quantization adjustment
    Medium,
    /// Favor heavily quantized models
    Low,
}

impl AccuracyPreference {
    /// Multiplier applied to the score of a 4-bit quantized model
    pub fn quantization_multiplier(&self) -> f64 {
        match self {
            AccuracyPreference::High => 0.8,
            AccuracyPreference::Medium => 1.0,
            AccuracyPreference::Low => 1.2,
        }
    }

    /// Wire name of the preference
    pub fn as_str(&self) -> &'static str {
        match self {
            AccuracyPreference::High => "high",
            AccuracyPreference::Medium => "medium",
            AccuracyPreference::Low => "low",
        }
    }
}

impl Default for AccuracyPreference {
    fn default() -> Self {
        AccuracyPreference::Medium
    }
}

impl fmt::Display for AccuracyPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccuracyPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(AccuracyPreference::High),
            "medium" => Ok(AccuracyPreference::Medium),
            "low" => Ok(AccuracyPreference::Low),
            _ => Err(format!("Unknown accuracy preference: {}", s)),
        }
    }
}

/// Hardware capability tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareType {
    /// General purpose CPU
    Cpu,
    /// NVIDIA CUDA GPU
    Cuda,
    /// AMD ROCm GPU
    Rocm,
    /// Neural processing unit
    Npu,
}

impl HardwareType {
    /// Tag name, also used as the device id prefix (`cuda:0`)
    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareType::Cpu => "cpu",
            HardwareType::Cuda => "cuda",
            HardwareType::Rocm => "rocm",
            HardwareType::Npu => "npu",
        }
    }

    /// Maps a device id such as `cuda:0` to its hardware tag
    pub fn from_device_id(device_id: &str) -> Option<Self> {
        let kind = device_id.split(':').next().unwrap_or(device_id);
        kind.parse().ok()
    }

    /// Returns true for anything that is not the host CPU
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, HardwareType::Cpu)
    }
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HardwareType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(HardwareType::Cpu),
            "cuda" | "gpu" => Ok(HardwareType::Cuda),
            "rocm" => Ok(HardwareType::Rocm),
            "npu" => Ok(HardwareType::Npu),
            _ => Err(format!("Unknown hardware type: {}", s)),
        }
    }
}

/// On-disk format of a model artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// Quantized single-file format for local CPU inference
    Gguf,
    /// Native framework checkpoint
    PyTorch,
}

impl ModelFormat {
    /// Classifies a file extension (without the dot)
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "gguf" => Some(ModelFormat::Gguf),
            "pt" | "pth" => Some(ModelFormat::PyTorch),
            _ => None,
        }
    }

    /// Resident memory needed per byte of artifact
    pub fn memory_multiplier(&self) -> u64 {
        match self {
            ModelFormat::Gguf => 2,
            ModelFormat::PyTorch => 3,
        }
    }

    /// Whether models in this format run noticeably better on an accelerator
    pub fn favors_accelerators(&self) -> bool {
        matches!(self, ModelFormat::PyTorch)
    }

    /// Whether models in this format usually accept batched input
    pub fn supports_batching(&self) -> bool {
        matches!(self, ModelFormat::PyTorch)
    }

    /// Wire name of the format
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::Gguf => "gguf",
            ModelFormat::PyTorch => "pytorch",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quantization scheme parsed from a model file name
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quantization {
    /// 4-bit, k-quant medium
    Q4_K_M,
    /// 4-bit, k-quant small
    Q4_K_S,
    /// 4-bit, legacy scheme 0
    Q4_0,
    /// 4-bit, legacy scheme 1
    Q4_1,
    /// 5-bit, legacy scheme 0
    Q5_0,
    /// 5-bit, legacy scheme 1
    Q5_1,
    /// 8-bit, legacy scheme 0
    Q8_0,
}

impl Quantization {
    /// Every tag, most specific first so substring matching is unambiguous
    pub const ALL: [Quantization; 7] = [
        Quantization::Q4_K_M,
        Quantization::Q4_K_S,
        Quantization::Q4_0,
        Quantization::Q4_1,
        Quantization::Q5_0,
        Quantization::Q5_1,
        Quantization::Q8_0,
    ];

    /// Canonical tag text
    pub fn as_str(&self) -> &'static str {
        match self {
            Quantization::Q4_K_M => "Q4_K_M",
            Quantization::Q4_K_S => "Q4_K_S",
            Quantization::Q4_0 => "Q4_0",
            Quantization::Q4_1 => "Q4_1",
            Quantization::Q5_0 => "Q5_0",
            Quantization::Q5_1 => "Q5_1",
            Quantization::Q8_0 => "Q8_0",
        }
    }

    /// Numeric level: the digit following the leading `Q`
    pub fn bits(&self) -> u32 {
        match self {
            Quantization::Q4_K_M | Quantization::Q4_K_S | Quantization::Q4_0 | Quantization::Q4_1 => 4,
            Quantization::Q5_0 | Quantization::Q5_1 => 5,
            Quantization::Q8_0 => 8,
        }
    }

    /// True for the 4-bit family
    pub fn is_heavily_quantized(&self) -> bool {
        self.bits() == 4
    }

    /// Finds the tag embedded in a file name, ignoring case
    pub fn detect(file_name: &str) -> Option<Self> {
        let name = file_name.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|q| name.contains(&q.as_str().to_lowercase()))
    }
}

impl fmt::Display for Quantization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Quantization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|q| q.as_str() == upper)
            .ok_or_else(|| format!("Unknown quantization: {}", s))
    }
}
