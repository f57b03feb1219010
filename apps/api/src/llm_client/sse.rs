//! Decoding of the provider's `text/event-stream` response body.

use serde::Deserialize;

use super::{LlmError, StreamEvent};

/// Splits a byte stream into complete server-sent events and yields the
/// joined `data:` payload of each one. Partial events stay buffered until the
/// blank line that terminates them arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buf.drain(..end + 2).collect();
            let block = String::from_utf8_lossy(&block[..end]);
            let data: Vec<&str> = block
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|d| d.strip_prefix(' ').unwrap_or(d))
                .collect();
            if !data.is_empty() {
                payloads.push(data.join("\n"));
            }
        }
        payloads
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Payload {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: ErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

/// Interprets one event payload. Events that carry no text and do not end
/// the message (pings, block starts, usage deltas) map to `None`.
pub fn parse_stream_payload(data: &str) -> Result<Option<StreamEvent>, LlmError> {
    match serde_json::from_str::<Payload>(data)? {
        Payload::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        } => Ok(Some(StreamEvent::Delta(text))),
        Payload::ContentBlockDelta { .. } => Ok(None),
        Payload::MessageStop => Ok(Some(StreamEvent::Finished)),
        Payload::Error { error } => Err(LlmError::Stream(format!(
            "{}: {}",
            error.kind, error.message
        ))),
        Payload::Other => Ok(None),
    }
}
