//! Hardware snapshot
//!
//! A [`HardwareSnapshot`] is assembled once, through its consuming builder
//! methods, and is read-only afterwards.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use common::types::HardwareType;

/// Capability record of one accelerator device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceleratorDevice {
    /// Device name
    pub name: String,

    /// Compute capability tag (e.g. "8.6")
    pub compute_capability: String,

    /// Total device memory in bytes
    pub total_memory: u64,

    /// Number of parallel units (streaming multiprocessors, compute units); 0 if unknown
    pub parallel_units: u32,
}

/// Immutable description of the machine's compute resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    /// CPU architecture (e.g. "x86_64")
    cpu_architecture: String,

    /// Physical core count
    cpu_cores: usize,

    /// Logical thread count
    cpu_threads: usize,

    /// Supported instruction set tags (e.g. "AVX2")
    instruction_sets: BTreeSet<String>,

    /// Total system memory in bytes
    total_memory: u64,

    /// Accelerators keyed by device id (`cuda:0`)
    accelerators: BTreeMap<String, AcceleratorDevice>,
}

impl HardwareSnapshot {
    /// Starts a snapshot with no instruction sets and no accelerators
    pub fn new(
        cpu_architecture: impl Into<String>,
        cpu_cores: usize,
        cpu_threads: usize,
        total_memory: u64,
    ) -> Self {
        Self {
            cpu_architecture: cpu_architecture.into(),
            cpu_cores,
            cpu_threads,
            instruction_sets: BTreeSet::new(),
            total_memory,
            accelerators: BTreeMap::new(),
        }
    }

    /// Adds instruction set tags
    pub fn with_instruction_sets<I, S>(mut self, sets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instruction_sets.extend(sets.into_iter().map(Into::into));
        self
    }

    /// Adds an accelerator under the given device id
    pub fn with_accelerator(mut self, device_id: impl Into<String>, device: AcceleratorDevice) -> Self {
        self.accelerators.insert(device_id.into(), device);
        self
    }

    /// CPU architecture
    pub fn cpu_architecture(&self) -> &str {
        &self.cpu_architecture
    }

    /// Physical core count
    pub fn cpu_cores(&self) -> usize {
        self.cpu_cores
    }

    /// Logical thread count
    pub fn cpu_threads(&self) -> usize {
        self.cpu_threads
    }

    /// Supported instruction set tags
    pub fn instruction_sets(&self) -> &BTreeSet<String> {
        &self.instruction_sets
    }

    /// Returns true if the CPU supports the given instruction set (case-insensitive)
    pub fn has_instruction_set(&self, tag: &str) -> bool {
        self.instruction_sets.iter().any(|set| set.eq_ignore_ascii_case(tag))
    }

    /// Total system memory in bytes
    pub fn total_memory(&self) -> u64 {
        self.total_memory
    }

    /// Accelerators keyed by device id
    pub fn accelerators(&self) -> &BTreeMap<String, AcceleratorDevice> {
        &self.accelerators
    }

    /// Returns true if at least one accelerator is present
    pub fn has_accelerators(&self) -> bool {
        !self.accelerators.is_empty()
    }

    /// Hardware tags of the accelerators present
    pub fn accelerator_kinds(&self) -> BTreeSet<HardwareType> {
        self.accelerators
            .keys()
            .filter_map(|id| HardwareType::from_device_id(id))
            .filter(|kind| kind.is_accelerator())
            .collect()
    }

    /// Accelerator with the most memory; ties go to the lowest device id
    pub fn largest_accelerator(&self) -> Option<(&str, &AcceleratorDevice)> {
        self.accelerators
            .iter()
            .fold(None, |best: Option<(&String, &AcceleratorDevice)>, (id, device)| match best {
                Some((_, current)) if current.total_memory >= device.total_memory => best,
                _ => Some((id, device)),
            })
            .map(|(id, device)| (id.as_str(), device))
    }

    /// Combined memory of all accelerators
    pub fn total_accelerator_memory(&self) -> u64 {
        self.accelerators.values().map(|device| device.total_memory).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn gpu(name: &str, memory_gib: u64) -> AcceleratorDevice {
        AcceleratorDevice {
            name: name.to_string(),
            compute_capability: "8.0".to_string(),
            total_memory: memory_gib * GIB,
            parallel_units: 40,
        }
    }

    #[test]
    fn test_cpu_only_snapshot() {
        let snapshot = HardwareSnapshot::new("x86_64", 8, 16, 16 * GIB).with_instruction_sets(["AVX2"]);

        assert_eq!(snapshot.cpu_architecture(), "x86_64");
        assert_eq!(snapshot.cpu_cores(), 8);
        assert_eq!(snapshot.cpu_threads(), 16);
        assert_eq!(snapshot.total_memory(), 16 * GIB);
        assert!(snapshot.has_instruction_set("avx2"));
        assert!(!snapshot.has_accelerators());
        assert!(snapshot.largest_accelerator().is_none());
        assert!(snapshot.accelerator_kinds().is_empty());
    }

    #[test]
    fn test_largest_accelerator() {
        let snapshot = HardwareSnapshot::new("x86_64", 8, 16, 32 * GIB)
            .with_accelerator("cuda:0", gpu("small", 8))
            .with_accelerator("cuda:1", gpu("big", 24))
            .with_accelerator("rocm:0", gpu("other", 16));

        let (id, device) = snapshot.largest_accelerator().unwrap();
        assert_eq!(id, "cuda:1");
        assert_eq!(device.name, "big");
        assert_eq!(snapshot.total_accelerator_memory(), 48 * GIB);
        assert_eq!(
            snapshot.accelerator_kinds().into_iter().collect::<Vec<_>>(),
            vec![HardwareType::Cuda, HardwareType::Rocm]
        );
    }

    #[test]
    fn test_largest_accelerator_tie_prefers_lowest_id() {
        let snapshot = HardwareSnapshot::new("x86_64", 8, 16, 32 * GIB)
            .with_accelerator("cuda:1", gpu("second", 8))
            .with_accelerator("cuda:0", gpu("first", 8));

        assert_eq!(snapshot.largest_accelerator().unwrap().0, "cuda:0");
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = HardwareSnapshot::new("aarch64", 4, 4, 8 * GIB).with_accelerator("cuda:0", gpu("g", 4));
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: HardwareSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
