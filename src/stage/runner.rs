//! Stage runner: drains one ledger through a [`StageAction`].
//!
//! # Per-item state machine
//!
//! ```text
//! Pending ──source missing──▶ removed (warning, no invocation)
//!    │
//!    ├──not accepted────────▶ left in ledger (skipped)
//!    │
//!    └──▶ Attempting ──Success──────────▶ removed from ledger
//!                    └─TerminalFailure──▶ left in ledger (failed)
//! ```
//!
//! Items are attempted one at a time.  The ledger entry is removed only
//! after the invoker has confirmed a non-empty artifact, so killing the
//! process at any point loses at most the in-flight item's output, which the
//! next run recreates.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::context::ContextError;
use crate::invoke::{InvocationResult, RetryingInvoker};
use crate::ledger::{Ledger, LedgerError};

use super::action::StageAction;

// ---------------------------------------------------------------------------
// StageError
// ---------------------------------------------------------------------------

/// A failure that stops the whole stage, as opposed to a per-item failure.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("cannot prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// ProcessingOrder
// ---------------------------------------------------------------------------

/// Order in which a drain visits ledger items.  The file is never reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingOrder {
    #[default]
    Natural,
    Reversed,
}

impl ProcessingOrder {
    pub fn from_reverse_flag(reverse: bool) -> Self {
        if reverse {
            ProcessingOrder::Reversed
        } else {
            ProcessingOrder::Natural
        }
    }

    pub fn apply(self, mut items: Vec<String>) -> Vec<String> {
        if self == ProcessingOrder::Reversed {
            items.reverse();
        }
        items
    }
}

// ---------------------------------------------------------------------------
// StageOutcome
// ---------------------------------------------------------------------------

/// Counts for one drain.  Reporting only; never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageOutcome {
    /// Artifact written and item removed.
    pub processed: usize,
    /// Attempts exhausted or terminal error; item still queued.
    pub failed: usize,
    /// Not something this stage handles; item still queued.
    pub skipped: usize,
    /// Source no longer exists; item removed.
    pub missing: usize,
}

impl StageOutcome {
    pub fn total(&self) -> usize {
        self.processed + self.failed + self.skipped + self.missing
    }
}

// ---------------------------------------------------------------------------
// StageRunner
// ---------------------------------------------------------------------------

pub struct StageRunner<A: StageAction> {
    action: A,
    invoker: RetryingInvoker,
    order: ProcessingOrder,
}

impl<A: StageAction> StageRunner<A> {
    pub fn new(action: A, invoker: RetryingInvoker) -> Self {
        Self {
            action,
            invoker,
            order: ProcessingOrder::Natural,
        }
    }

    pub fn with_order(mut self, order: ProcessingOrder) -> Self {
        self.order = order;
        self
    }

    pub fn action(&self) -> &A {
        &self.action
    }

    /// Process every item currently in the ledger at `ledger_path`.
    ///
    /// Draining an empty or missing ledger is a no-op that reports zeros.
    /// Per-item failures are counted, not returned; only ledger I/O errors
    /// abort the drain.
    pub async fn drain(&self, ledger_path: &Path) -> Result<StageOutcome, StageError> {
        let name = self.action.name();
        let ledger = Ledger::load(ledger_path)?;
        let mut outcome = StageOutcome::default();

        if ledger.is_empty() {
            log::info!("stage[{name}]: no items to process");
            return Ok(outcome);
        }

        let items = self.order.apply(ledger.items);
        let total = items.len();
        log::info!("stage[{name}]: {total} items pending");

        for (index, item) in items.iter().enumerate() {
            let source = PathBuf::from(item);
            let position = format!("[{}/{total}]", index + 1);

            if !source.exists() {
                log::warn!("stage[{name}]: {position} input not found, dropping: {item}");
                Ledger::remove_item(ledger_path, item)?;
                outcome.missing += 1;
                continue;
            }

            if !self.action.accepts(&source) {
                log::warn!("stage[{name}]: {position} skipping unsupported item: {item}");
                outcome.skipped += 1;
                continue;
            }

            let output = self.action.output_path(&source);
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent).map_err(|source| StageError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            log::info!("stage[{name}]: {position} processing {}", display_name(&source));

            let result = self
                .invoker
                .invoke(item, &output, |_| self.action.attempt(&source, &output))
                .await;

            match result {
                InvocationResult::Success { .. } => {
                    Ledger::remove_item(ledger_path, item)?;
                    outcome.processed += 1;
                }
                InvocationResult::TerminalFailure { .. }
                | InvocationResult::RetryableFailure { .. } => {
                    outcome.failed += 1;
                }
            }
        }

        log::info!(
            "stage[{name}]: done: processed {}, failed {}, skipped {}, missing {}",
            outcome.processed,
            outcome.failed,
            outcome.skipped,
            outcome.missing
        );
        Ok(outcome)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
