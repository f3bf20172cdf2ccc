//! Model metadata extraction
//!
//! Turns an artifact file on disk into a [`ModelArtifactMetadata`] record.

use std::fs;
use std::path::Path;

use tracing::debug;

use common::error::{Error, Result};
use common::models::ModelArtifactMetadata;
use common::types::{HardwareType, ModelFormat, Quantization};
use hardware_profiler::HardwareSnapshot;

/// Builds metadata records for artifact files
#[derive(Debug, Clone, Copy)]
pub struct MetadataExtractor<'a> {
    /// Hardware the artifacts will run on
    hardware: &'a HardwareSnapshot,
}

impl<'a> MetadataExtractor<'a> {
    /// Creates an extractor for the given hardware
    pub fn new(hardware: &'a HardwareSnapshot) -> Self {
        Self { hardware }
    }

    /// Classifies a file by its extension (case-insensitive)
    pub fn classify(path: &Path) -> Option<ModelFormat> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ModelFormat::from_extension(&ext.to_ascii_lowercase()))
    }

    /// Extracts metadata for one file
    ///
    /// Returns `Ok(None)` for files that are not model artifacts.
    pub fn extract(&self, path: &Path) -> Result<Option<ModelArtifactMetadata>> {
        let Some(format) = Self::classify(path) else {
            return Ok(None);
        };

        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| Error::Model(format!("Invalid model file name: {:?}", path)))?
            .to_string();

        let size_bytes = fs::metadata(path)?.len();
        let quantization = Quantization::detect(&name);

        let metadata = ModelArtifactMetadata {
            minimum_ram: estimate_minimum_ram(format, size_bytes),
            preferred_hardware: self.preferred_hardware(format),
            supports_batching: format.supports_batching(),
            path: path.to_path_buf(),
            name,
            format,
            size_bytes,
            quantization,
        };

        debug!(
            "Extracted {} metadata for '{}' ({} bytes, quantization: {:?})",
            format, metadata.name, size_bytes, quantization
        );

        Ok(Some(metadata))
    }

    /// Hardware tags an artifact of this format runs best on
    fn preferred_hardware(&self, format: ModelFormat) -> Vec<HardwareType> {
        let mut hardware = vec![HardwareType::Cpu];
        if format.favors_accelerators() {
            hardware.extend(self.hardware.accelerator_kinds());
        }
        hardware
    }
}

/// Estimated memory needed to load an artifact, never zero
pub fn estimate_minimum_ram(format: ModelFormat, size_bytes: u64) -> u64 {
    size_bytes.saturating_mul(format.memory_multiplier()).max(1)
}
