//! Vision-model transcription capability.
//!
//! [`TranscriptionService`] is the seam the transcription stage calls
//! through.  Output is streamed: implementations write each chunk into the
//! supplied sink as it arrives, so the concatenation in arrival order is the
//! transcript.
//!
//! [`GeminiTranscriber`] is the production implementation.

pub mod gemini;
pub mod sse;

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::invoke::AttemptError;

pub use gemini::GeminiTranscriber;

// ---------------------------------------------------------------------------
// TranscribeError
// ---------------------------------------------------------------------------

/// Errors that can occur during one transcription call.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("transcription request timed out")]
    Timeout,

    /// The API answered with a non-success status.
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// A streamed chunk could not be parsed.
    #[error("failed to parse response chunk: {0}")]
    Parse(String),

    /// The stream finished without any text.
    #[error("model returned an empty transcription")]
    EmptyResponse,

    /// The image cannot be sent (unreadable or unsupported format).
    #[error("unusable image: {0}")]
    Image(String),

    /// Writing the streamed text to the sink failed.
    #[error("failed to write transcription: {0}")]
    Output(#[from] std::io::Error),
}

impl TranscribeError {
    /// Transient failures worth another attempt.
    ///
    /// Client errors other than 408/429 and unusable images are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            TranscribeError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            TranscribeError::Image(_) => false,
            _ => true,
        }
    }
}

impl From<reqwest::Error> for TranscribeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TranscribeError::Timeout
        } else {
            TranscribeError::Request(e.to_string())
        }
    }
}

impl From<TranscribeError> for AttemptError {
    fn from(e: TranscribeError) -> Self {
        if e.is_retryable() {
            AttemptError::Retryable(e.to_string())
        } else {
            AttemptError::Terminal(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// TranscriptionService trait
// ---------------------------------------------------------------------------

/// Async, object-safe transcription backend.
///
/// # Arguments
/// * `image`  – Page image on disk.
/// * `prompt` – Instruction text, already composed with document context.
/// * `sink`   – Receives output chunks in arrival order.
///
/// Returns the number of bytes written to `sink`.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(
        &self,
        image: &Path,
        prompt: &str,
        sink: &mut (dyn Write + Send),
    ) -> Result<u64, TranscribeError>;
}

/// MIME type the API expects for an image path, by extension.
pub fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}
