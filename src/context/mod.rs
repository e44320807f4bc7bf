//! Document context for transcription prompts.
//!
//! This module provides:
//! * [`ContextBundle`] — global + per-image context loaded once per stage run.
//! * [`load_global`] / [`load_individual`] — the two directory scans.
//! * [`compose`] — pure prompt composition.
//! * [`BASE_PROMPT`] — the default transcription instruction.

pub mod bundle;
pub mod prompt;

pub use bundle::{load_global, load_individual, ContextBundle, ContextError};
pub use prompt::{compose, BASE_PROMPT};
