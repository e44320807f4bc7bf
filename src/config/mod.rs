//! Configuration module.
//!
//! Provides `PipelineConfig` (top-level settings), sub-configs for each stage,
//! `AppPaths` for the settings location, `PipelinePaths` for the per-run
//! layout, and TOML persistence via `PipelineConfig::load_from` /
//! `PipelineConfig::save_to`.

pub mod paths;
pub mod settings;

pub use paths::{AppPaths, PipelinePaths};
pub use settings::{
    CleanupConfig, ContextConfig, PipelineConfig, PreprocessConfig, RetryConfig,
    TranscriptionConfig,
};
