//! Stages: per-item actions and the runner that drains a ledger with them.
//!
//! ```text
//! ledger file ──▶ StageRunner::drain
//!                   ├─ missing source  → Ledger::remove_item
//!                   ├─ RetryingInvoker::invoke(StageAction::attempt)
//!                   │     ├─ Success          → Ledger::remove_item
//!                   │     └─ TerminalFailure  → keep
//!                   └─ StageOutcome
//! ```

pub mod action;
pub mod runner;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use action::{
    has_extension, partial_path, stem_of, PreprocessAction, StageAction, TranscribeAction,
};
pub use runner::{ProcessingOrder, StageError, StageOutcome, StageRunner};
