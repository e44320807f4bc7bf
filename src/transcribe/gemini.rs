//! Gemini `streamGenerateContent` transcriber.
//!
//! Sends the prompt and the page image (inline, base64) in one request and
//! writes every streamed text part into the sink as it arrives.  All
//! connection details come from [`TranscriptionConfig`].

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::TranscriptionConfig;

use super::sse::{chunk_text, SseLines};
use super::{mime_for, TranscribeError, TranscriptionService};

/// Calls `{base_url}/v1beta/models/{model}:streamGenerateContent?alt=sse`.
pub struct GeminiTranscriber {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTranscriber")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiTranscriber {
    /// Build from config and an already-resolved API key.
    ///
    /// A default client is used if the builder fails.
    pub fn from_config(config: &TranscriptionConfig, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }

    /// JSON body for one image + prompt request.
    pub fn request_body(prompt: &str, mime_type: &str, image: &[u8]) -> serde_json::Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": mime_type, "data": STANDARD.encode(image) } }
                ]
            }]
        })
    }
}

#[async_trait]
impl TranscriptionService for GeminiTranscriber {
    async fn transcribe(
        &self,
        image: &Path,
        prompt: &str,
        sink: &mut (dyn Write + Send),
    ) -> Result<u64, TranscribeError> {
        let mime_type = mime_for(image).ok_or_else(|| {
            TranscribeError::Image(format!("unsupported image type: {}", image.display()))
        })?;
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| TranscribeError::Image(format!("{}: {e}", image.display())))?;

        let mut response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(prompt, mime_type, &bytes))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscribeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut lines = SseLines::new();
        let mut written = 0u64;

        while let Some(chunk) = response.chunk().await? {
            for line in lines.push(&chunk) {
                written += emit(&line, sink)?;
            }
        }
        if let Some(line) = lines.finish() {
            written += emit(&line, sink)?;
        }
        sink.flush()?;

        if written == 0 {
            return Err(TranscribeError::EmptyResponse);
        }
        log::debug!("gemini: streamed {written} bytes for {}", image.display());
        Ok(written)
    }
}

fn emit(line: &str, sink: &mut (dyn Write + Send)) -> Result<u64, TranscribeError> {
    match chunk_text(line)? {
        Some(text) => {
            sink.write_all(text.as_bytes())?;
            Ok(text.len() as u64)
        }
        None => Ok(0),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
