//! Decoder for OpenAI-style chat completion event streams.
//!
//! Only `data: ` lines matter. Each carries a JSON chunk whose
//! `choices[0].delta.content` is appended to the result, until a `[DONE]`
//! payload. Chunks that fail to parse are logged and skipped.

use std::fmt::Display;

use chutes_mcp_core::context::ToolContext;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::{Result, ToolError};

const DATA_PREFIX: &str = "data: ";
const DONE: &str = "[DONE]";

/// Incremental decoder; feed it raw chunks as they arrive.
///
/// Bytes are buffered until a newline, so chunk boundaries may fall
/// anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct ChatStreamDecoder {
    buffer: Vec<u8>,
    text: String,
    deltas: usize,
    done: bool,
}

impl ChatStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk and returns how many content deltas it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> usize {
        if self.done {
            return 0;
        }
        let before = self.deltas;
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&line);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        self.deltas - before
    }

    /// Whether `[DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn deltas(&self) -> usize {
        self.deltas
    }

    /// Ends the stream and returns the accumulated text. A trailing line
    /// without a newline is still decoded.
    pub fn finish(mut self) -> String {
        if !self.done && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line);
        }
        self.text
    }

    fn process_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        let data = data.trim();
        if data == DONE {
            tracing::debug!("Stream finished with [DONE] signal");
            self.done = true;
            return;
        }

        let chunk: Value = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::error!("Failed to parse stream chunk: {} - Data: {}", e, data);
                return;
            }
        };
        match chunk.pointer("/choices/0/delta/content") {
            Some(Value::String(content)) if !content.is_empty() => {
                self.text.push_str(content);
                self.deltas += 1;
            }
            Some(_) => {}
            None => tracing::debug!("Stream chunk without delta content: {}", data),
        }
    }
}

/// Drains `stream` into the concatenated assistant text, reporting the
/// running delta count as progress.
///
/// A transport error discards what was accumulated. End of stream without
/// `[DONE]` is not an error.
pub async fn decode_chat_stream<S, B, E>(stream: S, ctx: &ToolContext) -> Result<String>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = ChatStreamDecoder::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(stream_error)?;
        if decoder.feed(chunk.as_ref()) > 0 {
            ctx.report_progress(decoder.deltas() as f64, None, None).await;
        }
        if decoder.is_done() {
            break;
        }
    }
    tracing::debug!("Stream decoded with {} deltas", decoder.deltas());
    Ok(decoder.finish())
}

pub fn stream_error(e: impl Display) -> ToolError {
    tracing::error!("Stream interrupted: {}", e);
    ToolError::Transport(format!("stream interrupted: {}", e))
}
