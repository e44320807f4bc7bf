//! Server-sent-event decoding for streamed `generateContent` responses.
//!
//! Bytes arrive in arbitrary chunks; [`SseLines`] reassembles whole lines
//! (never splitting a UTF-8 sequence) and [`chunk_text`] pulls the text parts
//! out of each `data:` payload.

use serde_json::Value;

use super::TranscribeError;

/// Incremental line splitter.
#[derive(Debug, Default)]
pub struct SseLines {
    buf: Vec<u8>,
}

impl SseLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every line completed by them, without the newline.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(decode(&line[..line.len() - 1]));
        }
        lines
    }

    /// Trailing line without a newline, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(decode(&rest))
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches('\r').to_string()
}

/// Text carried by one SSE line.
///
/// Non-`data:` lines (comments, `event:`, blanks) yield `Ok(None)`.  An
/// `error` object inside the payload is surfaced as a status error.
pub fn chunk_text(line: &str) -> Result<Option<String>, TranscribeError> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return Ok(None);
    }

    let json: Value =
        serde_json::from_str(payload).map_err(|e| TranscribeError::Parse(e.to_string()))?;

    if let Some(error) = json.get("error") {
        let status = error["code"]
            .as_u64()
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(500);
        let body = error["message"].as_str().unwrap_or("unknown error").to_string();
        return Err(TranscribeError::Status { status, body });
    }

    let text: String = json["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(text))
    }
}
