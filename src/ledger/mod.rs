//! Crash-resumable work queues backed by plain-text files.
//!
//! See [`Ledger`] for the file format and the single-writer rule.

pub mod store;

pub use store::{Ledger, LedgerError, SENTINEL};
