//! Pipeline settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  A single
//! [`PipelineConfig`] is built in `main` and handed to every component; there
//! is no process-wide configuration state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Bounded-retry settings for remote or fallible per-item calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per item, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt, in seconds.
    pub base_delay_secs: u64,
    /// Growth factor applied to the delay after every failed attempt.
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 5,
            multiplier: 3,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }
}

// ---------------------------------------------------------------------------
// PreprocessConfig
// ---------------------------------------------------------------------------

/// Settings for the OCR preprocessing stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Median blur kernel size.  Even values are bumped to the next odd one.
    pub blur_kernel_size: u32,
    /// Adaptive threshold neighbourhood size (odd, greater than 1).
    pub threshold_block_size: u32,
    /// Constant subtracted from the weighted neighbourhood mean.
    pub threshold_constant: i32,
    /// Grayscale conversion only; skips blur, threshold and morphology.
    pub simple_mode: bool,
    /// Source image extensions picked up during discovery (lower case, no dot).
    pub extensions: Vec<String>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: 3,
            threshold_block_size: 15,
            threshold_constant: 10,
            simple_mode: true,
            extensions: ["tif", "tiff", "png", "jpg", "jpeg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// TranscriptionConfig
// ---------------------------------------------------------------------------

/// Settings for the hosted vision-model transcription stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Model identifier (e.g. `"gemini-2.0-flash"`).
    pub model: String,
    /// Base URL of the generative-language API.
    pub base_url: String,
    /// Inline API key.  Takes precedence over `api_key_env` when non-empty.
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Drain the ledger from the bottom up.  Never changes the ledger file.
    pub reverse_order: bool,
    /// Extension of the written transcript files.
    pub output_extension: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".into(),
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: None,
            api_key_env: "GOOGLE_API_KEY".into(),
            timeout_secs: 120,
            reverse_order: true,
            output_extension: "txt".into(),
        }
    }
}

impl TranscriptionConfig {
    /// Resolve the API key: inline value first, then the environment.
    ///
    /// Returns `None` when neither source yields a non-empty key.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map(|k| k.trim().to_string())
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
            })
    }
}

// ---------------------------------------------------------------------------
// ContextConfig
// ---------------------------------------------------------------------------

/// Where document context for the transcription prompt is read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Directory name under the work dir.
    pub dir_name: String,
    /// File holding the context applied to every image.
    pub global_file: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            dir_name: "document_context".into(),
            global_file: "ALL_DOCUMENT_CONTEXT.txt".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// CleanupConfig
// ---------------------------------------------------------------------------

/// Post-hoc removal of boilerplate lines the model wraps around transcripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub start_phrase: String,
    pub end_phrase: String,
    /// Files scoring above this are reported for review.
    pub review_threshold: f32,
    /// Lines scoring above this are removed.
    pub removal_threshold: f32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            start_phrase: "Here is the transcribed text from the image".into(),
            end_phrase: "Let me know if you need any modifications or formatting adjustments"
                .into(),
            review_threshold: 0.5,
            removal_threshold: 0.7,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level pipeline configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use doc_transcribe::config::PipelineConfig;
///
/// // Load (returns Default when file is missing)
/// let config = PipelineConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory for tracking files, intermediate images and transcripts.
    pub work_dir: PathBuf,
    pub retry: RetryConfig,
    pub preprocess: PreprocessConfig,
    pub transcription: TranscriptionConfig,
    pub context: ContextConfig,
    pub cleanup: CleanupConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            retry: RetryConfig::default(),
            preprocess: PreprocessConfig::default(),
            transcription: TranscriptionConfig::default(),
            context: ContextConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(PipelineConfig::default())` when the file does not exist
    /// yet so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = PipelineConfig::default();
        original.save_to(&path).expect("save");

        let loaded = PipelineConfig::load_from(&path).expect("load");
        assert_eq!(original, loaded);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = PipelineConfig::load_from(&path).expect("should not error");
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn default_values() {
        let cfg = PipelineConfig::default();

        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.base_delay(), Duration::from_secs(5));
        assert_eq!(cfg.retry.multiplier, 3);
        assert_eq!(cfg.preprocess.blur_kernel_size, 3);
        assert_eq!(cfg.preprocess.threshold_block_size, 15);
        assert_eq!(cfg.preprocess.threshold_constant, 10);
        assert!(cfg.preprocess.simple_mode);
        assert_eq!(cfg.preprocess.extensions.len(), 5);
        assert_eq!(cfg.transcription.model, "gemini-2.0-flash");
        assert!(cfg.transcription.reverse_order);
        assert_eq!(cfg.context.global_file, "ALL_DOCUMENT_CONTEXT.txt");
    }

    /// A partial file only overrides the keys it names.
    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "work_dir = \"/srv/scans\"\n[retry]\nmax_attempts = 5\n",
        )
        .unwrap();

        let cfg = PipelineConfig::load_from(&path).expect("load");
        assert_eq!(cfg.work_dir, PathBuf::from("/srv/scans"));
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_delay_secs, 5);
        assert_eq!(cfg.transcription, TranscriptionConfig::default());
    }

    #[test]
    fn inline_api_key_wins_over_environment() {
        let cfg = TranscriptionConfig {
            api_key: Some("inline-key".into()),
            api_key_env: "DOC_TRANSCRIBE_TEST_UNSET_VAR".into(),
            ..TranscriptionConfig::default()
        };
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("inline-key"));
    }

    #[test]
    fn blank_key_and_missing_env_resolve_to_none() {
        let cfg = TranscriptionConfig {
            api_key: Some("   ".into()),
            api_key_env: "DOC_TRANSCRIBE_TEST_SURELY_UNSET_1234".into(),
            ..TranscriptionConfig::default()
        };
        assert!(cfg.resolve_api_key().is_none());
    }
}
