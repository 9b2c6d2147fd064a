//! Generic SSE (Server-Sent Events) line parser.
//!
//! Converts any byte stream into a `Stream<Item = SseEvent>`, and SSE events
//! into engine events.

use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::trace;

use relay_core::types::EngineEvent;

/// A parsed SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Parse a byte stream (e.g. a response body) as an SSE stream.
pub fn parse_sse_stream<S, E>(byte_stream: S) -> impl Stream<Item = anyhow::Result<SseEvent>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + 'static,
{
    // Raw bytes accumulate until a full line is available, so multi-byte
    // characters split across chunks decode intact.
    futures::stream::unfold(
        SseState {
            byte_stream: Box::pin(byte_stream),
            buffer: BytesMut::new(),
            current_event: None,
            current_data: Vec::new(),
            current_id: None,
            done: false,
        },
        |mut state| async move {
            loop {
                // Try to extract a line from the buffer
                if let Some(newline_pos) = state.buffer.iter().position(|&b| b == b'\n') {
                    let raw = state.buffer.split_to(newline_pos + 1);
                    let line = String::from_utf8_lossy(&raw[..newline_pos])
                        .trim_end_matches('\r')
                        .to_string();

                    if line.is_empty() {
                        // Empty line = dispatch event
                        if let Some(event) = state.take_event() {
                            return Some((Ok(event), state));
                        }
                        continue;
                    }

                    if line.starts_with(':') {
                        // Comment, skip
                        continue;
                    }

                    if let Some(value) = line.strip_prefix("event:") {
                        state.current_event = Some(value.trim_start().to_string());
                    } else if let Some(value) = line.strip_prefix("data:") {
                        state.current_data.push(value.trim_start().to_string());
                    } else if let Some(value) = line.strip_prefix("id:") {
                        state.current_id = Some(value.trim_start().to_string());
                    }
                    // Ignore unknown fields
                    continue;
                }

                if state.done {
                    return match state.take_event() {
                        Some(event) => Some((Ok(event), state)),
                        None => None,
                    };
                }

                // Need more data from the stream
                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        state.buffer.extend_from_slice(&chunk);
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        state.buffer.clear();
                        state.current_data.clear();
                        return Some((Err(anyhow::anyhow!("SSE stream error: {e}")), state));
                    }
                    None => {
                        // Stream ended. Flush the last unterminated line, then dispatch.
                        state.done = true;
                        if !state.buffer.is_empty() {
                            state.buffer.extend_from_slice(b"\n");
                        }
                    }
                }
            }
        },
    )
}

struct SseState<E> {
    byte_stream: std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>,
    buffer: BytesMut,
    current_event: Option<String>,
    current_data: Vec<String>,
    current_id: Option<String>,
    done: bool,
}

impl<E> SseState<E> {
    fn take_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            self.current_event = None;
            return None;
        }
        let event = SseEvent {
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
            id: self.current_id.take(),
        };
        self.current_data.clear();
        Some(event)
    }
}

/// Turn SSE events into engine events.
///
/// `metadata` events are skipped, an `end` event terminates the stream, and
/// every other `data` payload must decode as one [`EngineEvent`].
pub fn engine_events<S>(sse: S) -> impl Stream<Item = anyhow::Result<EngineEvent>>
where
    S: Stream<Item = anyhow::Result<SseEvent>>,
{
    sse.take_while(|item| !matches!(item, Ok(ev) if ev.event.as_deref() == Some("end")))
        .filter(|item| !matches!(item, Ok(ev) if ev.event.as_deref() == Some("metadata")))
        .map(|item| {
            let sse = item?;
            trace!(event = ?sse.event, "SSE event");
            serde_json::from_str::<EngineEvent>(&sse.data)
                .map_err(|e| anyhow::anyhow!("Undecodable engine event: {e}"))
        })
}
