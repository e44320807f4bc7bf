//! Bounded retries around one fallible per-item call.
//!
//! The caller supplies a closure performing a single attempt that is expected
//! to leave an artifact at `output`.  The attempt's own verdict is only half
//! of success: the artifact must also exist and be non-empty afterwards,
//! otherwise the attempt counts as a retryable failure.
//!
//! ```text
//! attempt 1 ──Ok + artifact──▶ Success
//!     │
//!     ├─Terminal──────────────▶ TerminalFailure
//!     │
//!     └─Retryable / empty ──sleep(base)──▶ attempt 2 ── … ──▶ attempt N
//!                                                          └─▶ TerminalFailure
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::policy::RetryPolicy;

// ---------------------------------------------------------------------------
// AttemptError
// ---------------------------------------------------------------------------

/// Classified failure of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// Worth trying again (transient API error, short output, I/O hiccup).
    #[error("{0}")]
    Retryable(String),
    /// Trying again cannot help (undecodable input, rejected request).
    #[error("{0}")]
    Terminal(String),
}

impl AttemptError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttemptError::Retryable(_))
    }
}

// ---------------------------------------------------------------------------
// InvocationResult
// ---------------------------------------------------------------------------

/// Outcome of one attempt, or of a whole invocation.
///
/// [`RetryingInvoker::attempt_once`] yields any variant;
/// [`RetryingInvoker::invoke`] only ever returns `Success` or
/// `TerminalFailure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationResult {
    Success { output: PathBuf, attempts: u32 },
    RetryableFailure { cause: String, attempt: u32 },
    TerminalFailure { cause: String, attempts: u32 },
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }
}

// ---------------------------------------------------------------------------
// RetryingInvoker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RetryingInvoker {
    policy: RetryPolicy,
}

impl RetryingInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `call` until it succeeds, fails terminally or runs out of
    /// attempts.  `call` receives the 1-based attempt number.
    ///
    /// Backoff sleeping is the only suspension point besides `call` itself.
    pub async fn invoke<F, Fut>(&self, label: &str, output: &Path, mut call: F) -> InvocationResult
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), AttemptError>>,
    {
        let max = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            match self.attempt_once(attempt, output, call(attempt)).await {
                InvocationResult::RetryableFailure { cause, attempt: n } => {
                    log::warn!("invoke: error processing {label} (attempt {n}/{max}): {cause}");
                    match self.policy.delay_after(n) {
                        Some(delay) => {
                            log::info!("invoke: retrying {label} in {} seconds", delay.as_secs());
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => {
                            log::warn!(
                                "invoke: FAILED after {max} attempts: {label} will remain pending"
                            );
                            return InvocationResult::TerminalFailure { cause, attempts: n };
                        }
                    }
                }
                InvocationResult::TerminalFailure { cause, attempts } => {
                    log::warn!("invoke: giving up on {label} (not retryable): {cause}");
                    return InvocationResult::TerminalFailure { cause, attempts };
                }
                success => {
                    log::info!("invoke: saved {}", output.display());
                    return success;
                }
            }
        }
    }

    /// Await one attempt and classify it, including the artifact check.
    pub async fn attempt_once<Fut>(&self, attempt: u32, output: &Path, call: Fut) -> InvocationResult
    where
        Fut: Future<Output = Result<(), AttemptError>>,
    {
        match call.await {
            Ok(()) => match artifact_len(output).await {
                Some(len) if len > 0 => InvocationResult::Success {
                    output: output.to_path_buf(),
                    attempts: attempt,
                },
                _ => InvocationResult::RetryableFailure {
                    cause: format!("output {} is empty or was not created", output.display()),
                    attempt,
                },
            },
            Err(AttemptError::Retryable(cause)) => {
                InvocationResult::RetryableFailure { cause, attempt }
            }
            Err(AttemptError::Terminal(cause)) => InvocationResult::TerminalFailure {
                cause,
                attempts: attempt,
            },
        }
    }
}

async fn artifact_len(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
