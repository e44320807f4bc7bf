//! Document context loaded from a directory snapshot.
//!
//! Layout of the context directory:
//!
//! ```text
//! document_context/
//!   ALL_DOCUMENT_CONTEXT.txt     ← applied to every image
//!   page_017_context.txt         ← applied to page_017.jpeg only
//! ```
//!
//! The bundle is loaded once when the transcription stage starts and is
//! read-only afterwards; edits made during a run take effect on the next one.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::context::prompt::compose;

const INDIVIDUAL_SUFFIX: &str = "_context";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to read context from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Trimmed content of the global context file, or `""` when absent.
pub fn load_global(context_dir: &Path, global_file: &str) -> Result<String, ContextError> {
    let path = context_dir.join(global_file);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(content.trim().to_string()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(ContextError::Io { path, source }),
    }
}

/// Map of lower-cased image basename → trimmed per-image context.
///
/// Picks up every regular file named `<basename>_context.<ext>` (suffix
/// matched case-insensitively) except the global file.  A missing directory
/// yields an empty map.
pub fn load_individual(
    context_dir: &Path,
    global_file: &str,
) -> Result<HashMap<String, String>, ContextError> {
    let mut mapping = HashMap::new();

    let entries = match std::fs::read_dir(context_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(mapping),
        Err(source) => {
            return Err(ContextError::Io {
                path: context_dir.to_path_buf(),
                source,
            })
        }
    };

    let global_lower = global_file.to_lowercase();

    for entry in entries {
        let entry = entry.map_err(|source| ContextError::Io {
            path: context_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if file_name.to_lowercase() == global_lower {
            continue;
        }
        let Some(basename) = individual_basename(&path) else {
            continue;
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ContextError::Io {
            path: path.clone(),
            source,
        })?;
        mapping.insert(basename, content.trim().to_string());
    }

    Ok(mapping)
}

/// `page_01_Context.txt` → `Some("page_01")`.
fn individual_basename(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?.to_lowercase();
    let base = stem.strip_suffix(INDIVIDUAL_SUFFIX)?;
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}

// ---------------------------------------------------------------------------
// ContextBundle
// ---------------------------------------------------------------------------

/// Global plus per-image context, fixed for the duration of a stage run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBundle {
    pub global: String,
    pub individual: HashMap<String, String>,
}

impl ContextBundle {
    /// Snapshot `context_dir`.  A missing directory gives an empty bundle.
    pub fn load(context_dir: &Path, global_file: &str) -> Result<Self, ContextError> {
        if !context_dir.is_dir() {
            log::info!(
                "context: {} does not exist; proceeding without context",
                context_dir.display()
            );
            return Ok(Self::default());
        }

        let global = load_global(context_dir, global_file)?;
        let individual = load_individual(context_dir, global_file)?;

        if !global.is_empty() {
            log::info!("context: using global context from {global_file}");
        }
        if !individual.is_empty() {
            log::info!("context: loaded individual context for {} images", individual.len());
        }
        if global.is_empty() && individual.is_empty() {
            log::info!("context: no context files found; proceeding without context");
        }

        Ok(Self { global, individual })
    }

    /// Prompt for the image with file stem `basename`.
    pub fn prompt_for(&self, basename: &str, base_prompt: &str) -> String {
        compose(basename, &self.global, &self.individual, base_prompt)
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.individual.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
