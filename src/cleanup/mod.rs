//! Post-hoc removal of boilerplate the model wraps around transcripts.
//!
//! Models sometimes open with "Here is the transcribed text from the image"
//! and close with an offer to reformat.  [`PhraseCleaner`] compares the first
//! and last line of every transcript against those phrases:
//!
//! * score > `review_threshold`  → the file is reported as a [`FlaggedFile`]
//! * score > `removal_threshold` → the line is removed and the file rewritten
//!
//! This runs after the pipeline and never touches the ledgers.

pub mod scorer;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::CleanupConfig;
use crate::stage::has_extension;

pub use scorer::{SimilarityScorer, TokenCosineScorer};

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("cannot read transcript directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A boundary line that looked like boilerplate.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedLine {
    /// 1-based line number in the original file.
    pub number: usize,
    pub text: String,
    pub score: f32,
}

/// A transcript reported for review.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedFile {
    pub path: PathBuf,
    pub first_line: Option<FlaggedLine>,
    pub last_line: Option<FlaggedLine>,
    /// Lines actually removed from the file.
    pub removed: usize,
}

pub struct PhraseCleaner {
    scorer: Box<dyn SimilarityScorer>,
    config: CleanupConfig,
    extension: String,
}

impl PhraseCleaner {
    /// Cleans `*.txt` files; see [`with_extension`](Self::with_extension).
    pub fn new(scorer: Box<dyn SimilarityScorer>, config: CleanupConfig) -> Self {
        Self {
            scorer,
            config,
            extension: "txt".into(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Clean every transcript directly inside `dir`.
    ///
    /// Only regular files with the transcript extension are considered, so
    /// `*.part` files of an interrupted run are never rewritten.  A file
    /// that cannot be read or rewritten is logged and skipped.
    pub fn clean_dir(&self, dir: &Path) -> Result<Vec<FlaggedFile>, CleanupError> {
        let io_err = |source| CleanupError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(io_err)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_extension(p, std::slice::from_ref(&self.extension)))
            .collect();
        files.sort();

        let mut flagged = Vec::new();
        for path in files {
            match self.clean_file(&path) {
                Ok(Some(file)) => flagged.push(file),
                Ok(None) => {}
                Err(e) => log::warn!("cleanup: skipping {}: {e}", path.display()),
            }
        }
        log::info!("cleanup: {} files flagged for review", flagged.len());
        Ok(flagged)
    }

    /// Clean one transcript.  Returns `Some` when it scored above the review
    /// threshold.
    pub fn clean_file(&self, path: &Path) -> std::io::Result<Option<FlaggedFile>> {
        let bytes = std::fs::read(path)?;
        let content = String::from_utf8_lossy(&bytes);
        let mut lines: Vec<&str> = content.lines().collect();
        let (Some(first), Some(last)) = (lines.first(), lines.last()) else {
            return Ok(None);
        };
        let (first, last) = (first.trim().to_string(), last.trim().to_string());
        let line_count = lines.len();

        let first_score = self.scorer.score(&first, &self.config.start_phrase);
        let last_score = self.scorer.score(&last, &self.config.end_phrase);

        let review = self.config.review_threshold;
        let flag = |number, text: String, score: f32| {
            (score > review).then_some(FlaggedLine {
                number,
                text,
                score,
            })
        };
        let first_line = flag(1, first, first_score);
        let last_line = flag(line_count, last, last_score);

        let mut removed = 0;
        if first_score > self.config.removal_threshold {
            log::info!(
                "cleanup: removing first line from {} (similarity {first_score:.2})",
                path.display()
            );
            lines.remove(0);
            removed += 1;
        }
        if last_score > self.config.removal_threshold && !lines.is_empty() {
            log::info!(
                "cleanup: removing last line from {} (similarity {last_score:.2})",
                path.display()
            );
            lines.pop();
            removed += 1;
        }
        if removed > 0 {
            let mut cleaned = lines.join("\n");
            cleaned.push('\n');
            std::fs::write(path, cleaned)?;
        }

        if first_line.is_none() && last_line.is_none() {
            return Ok(None);
        }
        Ok(Some(FlaggedFile {
            path: path.to_path_buf(),
            first_line,
            last_line,
            removed,
        }))
    }
}
