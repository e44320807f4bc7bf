//! Filesystem layout.
//!
//! [`AppPaths`] locates the settings file with the `dirs` crate:
//!
//!   Windows: %APPDATA%\doc-transcribe\settings.toml
//!   macOS:   ~/Library/Application Support/doc-transcribe/settings.toml
//!   Linux:   ~/.config/doc-transcribe/settings.toml
//!
//! [`PipelinePaths`] derives everything else from the configured work dir:
//!
//! ```text
//! <work_dir>/
//!   tracking/preprocess_pending.txt
//!   tracking/transcribe_pending.txt
//!   optimized_images/
//!   transcriptions/
//!   document_context/
//! ```

use std::path::{Path, PathBuf};

use super::PipelineConfig;

/// Location of the user-level settings file.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "doc-transcribe";

    /// Falls back to the current directory if the platform cannot provide a
    /// standard config path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);
        let settings_file = config_dir.join("settings.toml");

        Self {
            config_dir,
            settings_file,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved per-run directories and ledger files.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelinePaths {
    pub work_dir: PathBuf,
    pub tracking_dir: PathBuf,
    /// Ledger of source images awaiting preprocessing.
    pub preprocess_ledger: PathBuf,
    /// Ledger of preprocessed images awaiting transcription.
    pub transcribe_ledger: PathBuf,
    /// Output of the preprocess stage, input of the gather stage.
    pub optimized_dir: PathBuf,
    /// One transcript per processed image.
    pub transcription_dir: PathBuf,
    pub context_dir: PathBuf,
}

impl PipelinePaths {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::under(&config.work_dir, &config.context.dir_name)
    }

    fn under(work_dir: &Path, context_dir_name: &str) -> Self {
        let tracking_dir = work_dir.join("tracking");
        Self {
            work_dir: work_dir.to_path_buf(),
            preprocess_ledger: tracking_dir.join("preprocess_pending.txt"),
            transcribe_ledger: tracking_dir.join("transcribe_pending.txt"),
            tracking_dir,
            optimized_dir: work_dir.join("optimized_images"),
            transcription_dir: work_dir.join("transcriptions"),
            context_dir: work_dir.join(context_dir_name),
        }
    }

    /// Both ledgers, in stage order.
    pub fn ledgers(&self) -> [&Path; 2] {
        [&self.preprocess_ledger, &self.transcribe_ledger]
    }

    /// Create every directory a run writes into.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.tracking_dir, &self.optimized_dir, &self.transcription_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_file_is_named_settings_toml() {
        let paths = AppPaths::new();
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths.config_dir.ends_with("doc-transcribe"));
    }

    #[test]
    fn pipeline_paths_hang_off_work_dir() {
        let mut cfg = PipelineConfig::default();
        cfg.work_dir = PathBuf::from("/data/run");
        let paths = PipelinePaths::from_config(&cfg);

        assert_eq!(
            paths.preprocess_ledger,
            PathBuf::from("/data/run/tracking/preprocess_pending.txt")
        );
        assert_eq!(
            paths.transcribe_ledger,
            PathBuf::from("/data/run/tracking/transcribe_pending.txt")
        );
        assert_eq!(paths.optimized_dir, PathBuf::from("/data/run/optimized_images"));
        assert_eq!(paths.context_dir, PathBuf::from("/data/run/document_context"));
        assert_eq!(paths.ledgers().len(), 2);
    }

    #[test]
    fn create_dirs_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = PipelineConfig::default();
        cfg.work_dir = dir.path().to_path_buf();
        let paths = PipelinePaths::from_config(&cfg);

        paths.create_dirs().unwrap();
        paths.create_dirs().unwrap();
        assert!(paths.tracking_dir.is_dir());
        assert!(paths.optimized_dir.is_dir());
        assert!(paths.transcription_dir.is_dir());
    }
}
