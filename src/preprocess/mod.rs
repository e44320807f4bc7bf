//! OCR preprocessing capability.
//!
//! [`ImagePreprocessor`] is the seam the preprocess stage calls through; it
//! is synchronous and CPU-bound, so the stage runs it on the blocking pool.
//! [`ImageFilter`] is the production implementation.

pub mod filter;

use std::path::Path;

use thiserror::Error;

use crate::config::PreprocessConfig;
use crate::invoke::AttemptError;

pub use filter::{adaptive_threshold_gaussian, median_blur, ImageFilter};

// ---------------------------------------------------------------------------
// PreprocessError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum PreprocessError {
    /// The source could not be read from disk.
    #[error("unable to read image: {0}")]
    Read(String),

    /// The source is not a decodable image.
    #[error("unable to decode image: {0}")]
    Decode(String),

    /// The processed image could not be written.
    #[error("failed to save image: {0}")]
    Write(String),

    /// The options violate the filter's constraints.
    #[error("invalid preprocess options: {0}")]
    InvalidOptions(String),
}

impl PreprocessError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PreprocessError::Read(_) | PreprocessError::Write(_))
    }
}

impl From<PreprocessError> for AttemptError {
    fn from(e: PreprocessError) -> Self {
        if e.is_retryable() {
            AttemptError::Retryable(e.to_string())
        } else {
            AttemptError::Terminal(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// PreprocessOptions
// ---------------------------------------------------------------------------

/// Filter parameters for one preprocessing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessOptions {
    /// Median blur kernel; even values are bumped to the next odd one.
    pub blur_kernel_size: u32,
    /// Adaptive threshold block size; odd and greater than 1.
    pub threshold_block_size: u32,
    pub threshold_constant: i32,
    /// Grayscale only.
    pub simple_mode: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self::from_config(&PreprocessConfig::default())
    }
}

impl PreprocessOptions {
    pub fn from_config(config: &PreprocessConfig) -> Self {
        Self {
            blur_kernel_size: config.blur_kernel_size,
            threshold_block_size: config.threshold_block_size,
            threshold_constant: config.threshold_constant,
            simple_mode: config.simple_mode,
        }
    }

    /// Blur kernel actually used: forced odd.
    pub fn effective_blur_kernel(&self) -> u32 {
        if self.blur_kernel_size % 2 == 0 {
            self.blur_kernel_size + 1
        } else {
            self.blur_kernel_size
        }
    }

    /// Reject settings the threshold step cannot use.  Simple mode ignores them.
    pub fn validate(&self) -> Result<(), PreprocessError> {
        if self.simple_mode {
            return Ok(());
        }
        let block = self.threshold_block_size;
        if block <= 1 || block % 2 == 0 {
            return Err(PreprocessError::InvalidOptions(format!(
                "threshold block size must be odd and greater than 1, got {block}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ImagePreprocessor trait
// ---------------------------------------------------------------------------

/// Turns a source image into a normalised output image at `dest`.
///
/// Implementations must be `Send + Sync` so they can be shared behind an
/// `Arc<dyn ImagePreprocessor>` and moved onto the blocking pool.
pub trait ImagePreprocessor: Send + Sync {
    fn preprocess(
        &self,
        source: &Path,
        dest: &Path,
        options: &PreprocessOptions,
    ) -> Result<(), PreprocessError>;
}

// Compile-time assertion: Box<dyn ImagePreprocessor> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn ImagePreprocessor>) {}
};
