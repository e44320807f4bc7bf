//! Pipeline orchestrator for document transcription.
//!
//! # Architecture
//!
//! ```text
//! input_path/*.{tif,png,...}
//!        │  discover_images
//!        ▼
//! tracking/preprocess_pending.txt ──StageRunner<PreprocessAction>──▶ optimized_images/*.jpeg
//!                                                                          │  gather_processed
//!                                                                          ▼
//! tracking/transcribe_pending.txt ──StageRunner<TranscribeAction>──▶ transcriptions/*.txt
//!        │
//!        └─ both ledgers empty → teardown
//! ```
//!
//! All cross-stage communication goes through the filesystem; nothing is
//! shared in memory between stages.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use doc_transcribe::config::PipelineConfig;
//! use doc_transcribe::pipeline::PipelineOrchestrator;
//! use doc_transcribe::preprocess::ImageFilter;
//! use doc_transcribe::transcribe::gemini::GeminiTranscriber;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PipelineConfig::default();
//!     let key = config.transcription.resolve_api_key().unwrap_or_default();
//!     let transcriber = GeminiTranscriber::from_config(&config.transcription, key);
//!
//!     let orchestrator =
//!         PipelineOrchestrator::new(config, Arc::new(ImageFilter::new()), Arc::new(transcriber));
//!     let report = orchestrator.run(Path::new("scans"), false).await.unwrap();
//!     println!("{report:?}");
//! }
//! ```

pub mod discover;
pub mod orchestrator;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use discover::{discover_images, gather_processed, remove_partials, PROCESSED_EXTENSION};
pub use orchestrator::{PipelineError, PipelineOrchestrator, PipelineReport};
