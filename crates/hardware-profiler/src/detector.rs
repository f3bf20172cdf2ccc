//! Hardware detection
//!
//! Builds a [`HardwareSnapshot`] for the running machine. Detection never
//! fails: anything that cannot be probed is left out and the snapshot
//! degrades to what is known (at worst a CPU-only machine).

use std::collections::BTreeSet;
use std::process::Command;

use sysinfo::{System, SystemExt};
use tracing::{debug, info};

use common::utils::format_bytes;

use crate::capabilities::{AcceleratorDevice, HardwareSnapshot};

/// Detects the compute resources of the running machine
#[derive(Debug, Clone)]
pub struct HardwareDetector {
    /// Program queried for NVIDIA devices
    nvidia_smi: String,
}

impl Default for HardwareDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareDetector {
    /// Creates a detector using `nvidia-smi` from `PATH`
    pub fn new() -> Self {
        Self {
            nvidia_smi: "nvidia-smi".to_string(),
        }
    }

    /// Overrides the program used to enumerate NVIDIA devices
    pub fn with_nvidia_smi(mut self, program: impl Into<String>) -> Self {
        self.nvidia_smi = program.into();
        self
    }

    /// Detects and profiles the system hardware
    pub fn detect(&self) -> HardwareSnapshot {
        let mut system = System::new();
        system.refresh_memory();
        let total_memory = system.total_memory();

        let mut snapshot = HardwareSnapshot::new(
            std::env::consts::ARCH,
            num_cpus::get_physical(),
            num_cpus::get(),
            total_memory,
        )
        .with_instruction_sets(detect_instruction_sets());

        for (device_id, device) in self.detect_cuda_devices() {
            snapshot = snapshot.with_accelerator(device_id, device);
        }

        info!(
            "Detected {} with {} cores / {} threads, {} memory, {} accelerator(s)",
            snapshot.cpu_architecture(),
            snapshot.cpu_cores(),
            snapshot.cpu_threads(),
            format_bytes(snapshot.total_memory()),
            snapshot.accelerators().len()
        );

        snapshot
    }

    /// Enumerates NVIDIA devices through `nvidia-smi`
    fn detect_cuda_devices(&self) -> Vec<(String, AcceleratorDevice)> {
        let output = match Command::new(&self.nvidia_smi)
            .args([
                "--query-gpu=index,name,compute_cap,memory.total",
                "--format=csv,noheader,nounits",
            ])
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                debug!("{} not available: {}", self.nvidia_smi, e);
                return Vec::new();
            }
        };

        if !output.status.success() {
            debug!("{} exited with {}", self.nvidia_smi, output.status);
            return Vec::new();
        }

        parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parses `nvidia-smi --query-gpu=index,name,compute_cap,memory.total` CSV output
///
/// Memory is reported in MiB. Lines that do not parse are skipped.
pub fn parse_nvidia_smi(output: &str) -> Vec<(String, AcceleratorDevice)> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 4 {
                return None;
            }

            let index: u32 = fields[0].parse().ok()?;
            let memory_mib: u64 = fields[3].parse().ok()?;

            Some((
                format!("cuda:{}", index),
                AcceleratorDevice {
                    name: fields[1].to_string(),
                    compute_capability: fields[2].to_string(),
                    total_memory: memory_mib * 1024 * 1024,
                    parallel_units: 0,
                },
            ))
        })
        .collect()
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detect_instruction_sets() -> BTreeSet<String> {
    let cpuid = raw_cpuid::CpuId::new();
    let mut sets = BTreeSet::new();

    if let Some(features) = cpuid.get_feature_info() {
        if features.has_sse42() {
            sets.insert("SSE4.2".to_string());
        }
        if features.has_avx() {
            sets.insert("AVX".to_string());
        }
        if features.has_fma() {
            sets.insert("FMA".to_string());
        }
    }

    if let Some(features) = cpuid.get_extended_feature_info() {
        if features.has_avx2() {
            sets.insert("AVX2".to_string());
        }
        if features.has_avx512f() {
            sets.insert("AVX512".to_string());
        }
    }

    sets
}

#[cfg(target_arch = "aarch64")]
fn detect_instruction_sets() -> BTreeSet<String> {
    // Advanced SIMD is mandatory on AArch64
    BTreeSet::from(["NEON".to_string()])
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
fn detect_instruction_sets() -> BTreeSet<String> {
    BTreeSet::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nvidia_smi() {
        let output = "0, NVIDIA GeForce RTX 3080, 8.6, 10240\n1, Tesla T4, 7.5, 15360\n";
        let devices = parse_nvidia_smi(output);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].0, "cuda:0");
        assert_eq!(devices[0].1.name, "NVIDIA GeForce RTX 3080");
        assert_eq!(devices[0].1.compute_capability, "8.6");
        assert_eq!(devices[0].1.total_memory, 10240 * 1024 * 1024);
        assert_eq!(devices[1].0, "cuda:1");
    }

    #[test]
    fn test_parse_nvidia_smi_skips_garbage() {
        let output = "No devices were found\n0, GPU, 8.0, [N/A]\n";
        assert!(parse_nvidia_smi(output).is_empty());
    }

    #[test]
    fn test_missing_nvidia_smi_degrades_to_cpu() {
        let detector = HardwareDetector::new().with_nvidia_smi("definitely-not-a-real-program-7f3a");
        let snapshot = detector.detect();

        assert!(!snapshot.has_accelerators());
        assert!(snapshot.cpu_threads() >= 1);
        assert!(!snapshot.cpu_architecture().is_empty());
    }
}
