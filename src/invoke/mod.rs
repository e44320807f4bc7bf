//! Retry wrapper for unreliable per-item calls.
//!
//! * [`RetryPolicy`] — attempt budget and exponential backoff schedule.
//! * [`RetryingInvoker`] — runs one attempt at a time, sleeping in between.
//! * [`AttemptError`] — the caller's retryable / terminal classification.
//! * [`InvocationResult`] — tri-state outcome consumed by the stage runner.

pub mod invoker;
pub mod policy;

pub use invoker::{AttemptError, InvocationResult, RetryingInvoker};
pub use policy::RetryPolicy;
