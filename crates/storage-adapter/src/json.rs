//! JSON document storage
//!
//! Each [`JsonStore`] owns a single file. Writes go through a temporary file in
//! the same directory and are renamed into place, so readers never observe a
//! half-written document.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use common::error::{Error, Result};

/// A single JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonStore {
    /// Document path
    path: PathBuf,
}

impl JsonStore {
    /// Creates a store for the given path; nothing is touched on disk
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Document path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the document exists
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Loads and deserializes the document
    ///
    /// Returns `Ok(None)` when the file does not exist. Read and parse
    /// failures are returned as errors; callers decide whether they are fatal.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::from_str(&contents)?;
        debug!("Loaded {:?}", self.path);

        Ok(Some(value))
    }

    /// Serializes and atomically writes the document
    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut file = NamedTempFile::new_in(&parent)?;
        serde_json::to_writer_pretty(&mut file, value)?;
        file.write_all(b"\n")?;
        file.flush()?;

        file.persist(&self.path)
            .map_err(|e| Error::Storage(format!("Failed to persist {:?}: {}", self.path, e.error)))?;

        debug!("Saved {:?}", self.path);

        Ok(())
    }
}
