//! NDJSON → SSE streaming adapter for OpenAI compatibility.
//!
//! Ollama streams newline-delimited JSON (one native event per line), while
//! OpenAI clients expect Server-Sent Events. This module translates between
//! the two on the fly, one line in and at most one frame out, without
//! buffering more than the current partial line.

use std::convert::Infallible;
use std::fmt::Display;

use axum::response::{
    IntoResponse, Response,
    sse::{Event, Sse},
};
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, stream::BoxStream};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::forward::{apply_stream_headers, copy_response_headers};
use crate::models::{ErrorBody, NativeResponse};
use crate::translate::{EndpointKind, chat_chunk, completion_chunk};

/// Which native stream is being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// `/api/chat` events → `chat.completion.chunk`.
    Chat,
    /// `/api/generate` events → `text_completion` chunks.
    Completion,
}

impl StreamKind {
    /// Stream kind for an endpoint, if that endpoint can stream at all.
    #[must_use]
    pub const fn for_endpoint(kind: EndpointKind) -> Option<Self> {
        match kind {
            EndpointKind::Chat => Some(Self::Chat),
            EndpointKind::Completion => Some(Self::Completion),
            EndpointKind::Embedding | EndpointKind::ModelList => None,
        }
    }
}

/// One frame of the translated stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A translated chunk, sent as `event: message`.
    Chunk(Value),
    /// Upstream read failure, sent as `event: error`. Always the last event.
    Error(String),
    /// The optional `data: [DONE]` terminator.
    Done,
}

impl StreamEvent {
    /// Render as an SSE frame.
    #[must_use]
    pub fn into_sse(self) -> Event {
        match self {
            Self::Chunk(chunk) => Event::default().event("message").data(chunk.to_string()),
            Self::Error(message) => {
                let body = serde_json::to_string(&ErrorBody::new(message))
                    .unwrap_or_else(|_| r#"{"error":"stream error"}"#.to_string());
                Event::default().event("error").data(body)
            }
            Self::Done => Event::default().data("[DONE]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    /// `done:true` was seen; only the sentinel remains.
    SentinelPending,
    Finished,
}

/// State threaded through the `unfold` stream.
struct TranslatorState<E> {
    stream: BoxStream<'static, Result<Bytes, E>>,
    buf: BytesMut,
    model: String,
    kind: StreamKind,
    emit_done_sentinel: bool,
    upstream_ended: bool,
    phase: Phase,
    emitted: usize,
}

impl<E> TranslatorState<E> {
    /// Normal end of the stream: optionally followed by the sentinel.
    fn finish(&mut self) {
        self.phase = if self.emit_done_sentinel {
            Phase::SentinelPending
        } else {
            Phase::Finished
        };
    }

    /// Translate one NDJSON line. `None` means the line produced nothing.
    fn translate_line(&mut self, line: &[u8]) -> Option<StreamEvent> {
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        let native: NativeResponse = match serde_json::from_str(trimmed) {
            Ok(native) => native,
            Err(e) => {
                debug!(error = %e, line = %trimmed, "Skipping unparsable stream line");
                return None;
            }
        };

        let chunk = match self.kind {
            StreamKind::Chat => to_chunk(&chat_chunk(&native, &self.model)),
            StreamKind::Completion => to_chunk(&completion_chunk(&native, &self.model)),
        };

        if native.is_done() {
            self.finish();
        }

        chunk.map(|chunk| {
            self.emitted += 1;
            StreamEvent::Chunk(chunk)
        })
    }
}

impl<E> Drop for TranslatorState<E> {
    fn drop(&mut self) {
        if self.phase == Phase::Running && !self.upstream_ended {
            debug!(
                model = %self.model,
                emitted = self.emitted,
                "Stream closed before upstream finished; releasing upstream body"
            );
        }
    }
}

fn to_chunk<T: Serialize>(chunk: &T) -> Option<Value> {
    serde_json::to_value(chunk)
        .map_err(|e| warn!(error = %e, "Failed to serialize stream chunk"))
        .ok()
}

fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Translate a native NDJSON byte stream into OpenAI stream events.
///
/// Chunk boundaries of `byte_stream` are arbitrary. The output ends after the
/// first `done:true` event, at end of input, or right after an `Error` event.
pub fn translate_stream<S, E>(
    byte_stream: S,
    model: String,
    kind: StreamKind,
    emit_done_sentinel: bool,
) -> impl Stream<Item = StreamEvent> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = TranslatorState {
        stream: byte_stream.boxed(),
        buf: BytesMut::new(),
        model,
        kind,
        emit_done_sentinel,
        upstream_ended: false,
        phase: Phase::Running,
        emitted: 0,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            match st.phase {
                Phase::Finished => return None,
                Phase::SentinelPending => {
                    st.phase = Phase::Finished;
                    return Some((StreamEvent::Done, st));
                }
                Phase::Running => {}
            }

            // Complete line in the buffer.
            if let Some(line_end) = find_newline(&st.buf) {
                let line = st.buf.split_to(line_end + 1);
                if let Some(event) = st.translate_line(&line[..line_end]) {
                    return Some((event, st));
                }
                continue;
            }

            if st.upstream_ended {
                // Trailing line without a newline.
                let rest = st.buf.split();
                let event = st.translate_line(&rest);
                if st.phase == Phase::Running {
                    st.finish();
                }
                if let Some(event) = event {
                    return Some((event, st));
                }
                continue;
            }

            // Need more data from upstream.
            match st.stream.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    warn!(model = %st.model, error = %e, "Upstream stream error");
                    st.phase = Phase::Finished;
                    return Some((StreamEvent::Error(format!("upstream stream error: {e}")), st));
                }
                None => {
                    debug!(model = %st.model, emitted = st.emitted, "Upstream stream ended");
                    st.upstream_ended = true;
                }
            }
        }
    })
}

/// Build the SSE response for a streaming OpenAI request.
///
/// Upstream headers are copied, then the event-stream headers override them.
pub fn sse_response(
    upstream: reqwest::Response,
    model: String,
    kind: StreamKind,
    emit_done_sentinel: bool,
) -> Response {
    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();

    let events = translate_stream(upstream.bytes_stream(), model, kind, emit_done_sentinel)
        .map(|event| Ok::<_, Infallible>(event.into_sse()));

    let mut response = Sse::new(events).into_response();
    *response.status_mut() = status;
    copy_response_headers(&upstream_headers, response.headers_mut());
    apply_stream_headers(response.headers_mut());
    response
}
