//! Directory scans that feed the ledgers.

use std::io;
use std::path::{Path, PathBuf};

use crate::stage::has_extension;

/// Extension of every image the preprocess stage writes.
pub const PROCESSED_EXTENSION: &str = "jpeg";

/// Regular files directly inside `dir` whose extension is one of
/// `extensions` (case-insensitive), sorted by path.
pub fn discover_images(dir: &Path, extensions: &[String]) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if has_extension(&path, extensions) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Preprocessed images in `dir`.  A missing directory yields nothing.
pub fn gather_processed(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    discover_images(dir, &[PROCESSED_EXTENSION.to_string()])
}

/// Delete `*.part` files left in `dir` by a run that was killed mid-write.
/// Returns how many were removed; a missing directory removes nothing.
pub fn remove_partials(dir: &Path) -> io::Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "part") {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

pub(crate) fn to_items(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect()
}
