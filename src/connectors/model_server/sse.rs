use super::StreamChunk;
use crate::connectors::ConnectorError;
use crate::models::TokenUsage;
use serde::Deserialize;

#[derive(Debug, PartialEq)]
pub(crate) enum SseEvent {
    Data(String),
    Done,
}

/// Splits a server-sent-events byte stream into `data:` payloads.
/// Lines may arrive split across network chunks.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = vec![];
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = Self::parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing line that was not newline terminated.
    pub(crate) fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        Self::parse_line(&line)
    }

    fn parse_line(line: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(line);
        let data = line.trim().strip_prefix("data:")?.trim();
        if data == "[DONE]" {
            Some(SseEvent::Done)
        } else if data.is_empty() {
            None
        } else {
            Some(SseEvent::Data(data.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<TokenUsage>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Turns one `data:` payload into the chunks it carries.
pub(crate) fn parse_chunk(data: &str) -> Vec<Result<StreamChunk, ConnectorError>> {
    let chunk: CompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(err) => {
            tracing::warn!("Skipping malformed stream chunk: {}", err);
            return vec![];
        }
    };

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return vec![Err(ConnectorError::HttpError(message))];
    }

    let mut chunks: Vec<Result<StreamChunk, ConnectorError>> = chunk
        .choices
        .into_iter()
        .take(1)
        .filter_map(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(|content| Ok(StreamChunk::Fragment(content)))
        .collect();

    if let Some(usage) = chunk.usage {
        chunks.push(Ok(StreamChunk::Usage(usage)));
    }
    chunks
}
