//! Document-image transcription pipeline.
//!
//! Images are discovered, preprocessed for OCR, transcribed by a hosted
//! vision model and written out as text files.  Progress lives in plain-text
//! ledgers so every stage can be killed and restarted without losing or
//! duplicating work.

pub mod cleanup;
pub mod config;
pub mod context;
pub mod invoke;
pub mod ledger;
pub mod pipeline;
pub mod preprocess;
pub mod stage;
pub mod transcribe;
