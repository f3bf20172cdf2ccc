//! Disk footprint accounting
//!
//! Helpers for measuring and pruning the directory that holds model artifacts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use common::error::Result;

/// Total size in bytes of the regular files under `root` accepted by `include`
///
/// Entries that cannot be read are skipped.
pub fn directory_size(root: &Path, include: impl Fn(&Path) -> bool) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry under {:?}: {}", root, e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| include(entry.path()))
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Regular files under `root` whose stem equals `stem` and that `include`
/// accepts, with their sizes
///
/// Results are sorted by path.
pub fn files_with_stem(
    root: &Path,
    stem: &str,
    include: impl Fn(&Path) -> bool,
) -> Vec<(PathBuf, u64)> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().file_stem().and_then(|s| s.to_str()) == Some(stem))
        .filter(|entry| include(entry.path()))
        .map(|entry| {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            (entry.into_path(), size)
        })
        .collect()
}

/// Removes a file, treating an already-missing file as success
///
/// Returns `Ok(true)` if the file was removed and `Ok(false)` if it was not
/// there.
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
