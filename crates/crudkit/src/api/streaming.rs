//! Server-Sent Events (SSE) stream assembly.
//!
//! [`SseEngine`] turns raw byte flushes into ordered [`StreamEvent`]s:
//!
//! - incomplete UTF-8 sequences and incomplete lines are carried into the
//!   next flush, so a character split across flushes decodes once;
//! - each line is matched against `id:`, `event:`, `data:`, `retry:` and the
//!   provider error prefix, anything else is ignored;
//! - a `data` value containing the done sentinel emits [`StreamEvent::Done`]
//!   and ends the stream;
//! - other `data` values are parsed into the SDK's [`StreamChunk`] type, and
//!   non-empty text fragments are accumulated and emitted as
//!   [`StreamEvent::Text`].
//!
//! Malformed frames are logged and dropped; the engine itself never fails.
//! [`pump_sse`] and [`pump_bytes`] drive an engine (or raw byte delivery)
//! from a transport [`ByteStream`] with cancellation.

use std::time::Duration;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::transport::ByteStream;
use crate::config::ClientConfiguration;
use crate::error::TransportError;

/// A lifecycle event of one streaming call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The first flush arrived.
    Start,
    /// A non-empty text fragment, in arrival order.
    Text(String),
    /// An undecoded chunk (raw-binary streams only).
    Bytes(Vec<u8>),
    /// A provider error frame, or a transport failure mid-stream.
    Error(String),
    /// The stream is complete. Emitted at most once and always last.
    Done,
}

/// A deserialized stream chunk that may carry a text fragment.
///
/// Implemented by the SDK for its provider's chunk shape:
///
/// ```
/// use crudkit::api::StreamChunk;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Delta { text: Option<String> }
///
/// impl StreamChunk for Delta {
///     fn text(&self) -> Option<&str> {
///         self.text.as_deref()
///     }
/// }
/// ```
pub trait StreamChunk: DeserializeOwned {
    /// The text fragment carried by this chunk. `None` or empty marks a
    /// control chunk that is not accumulated.
    fn text(&self) -> Option<&str>;
}

/// JSON pointers tried for untyped chunks, covering the common
/// chat-completion, messages, and generate-content shapes.
const TEXT_POINTERS: [&str; 5] = [
    "/choices/0/delta/content",
    "/delta/text",
    "/candidates/0/content/parts/0/text",
    "/text",
    "/content",
];

impl StreamChunk for serde_json::Value {
    fn text(&self) -> Option<&str> {
        TEXT_POINTERS
            .iter()
            .find_map(|p| self.pointer(p).and_then(serde_json::Value::as_str))
    }
}

// ── Frames ─────────────────────────────────────────────────────────

/// The SSE field a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseField {
    Id,
    Event,
    Data,
    Retry,
    Error,
}

/// One parsed `field:value` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SseFrame<'a> {
    pub field: SseField,
    pub value: &'a str,
}

/// Parse a single line into a frame. Unknown fields and comments yield `None`.
pub fn parse_line<'a>(line: &'a str, error_prefix: &str) -> Option<SseFrame<'a>> {
    let line = line.trim_end_matches(['\r', '\n']);
    let prefixes = [
        ("data:", SseField::Data),
        ("event:", SseField::Event),
        ("id:", SseField::Id),
        ("retry:", SseField::Retry),
        (error_prefix, SseField::Error),
    ];
    prefixes.iter().find_map(|(prefix, field)| {
        if prefix.is_empty() {
            return None;
        }
        line.strip_prefix(prefix).map(|rest| SseFrame {
            field: *field,
            value: rest.strip_prefix(' ').unwrap_or(rest),
        })
    })
}

// ── UTF-8 carryover ────────────────────────────────────────────────

/// Decodes byte flushes, holding back an incomplete trailing sequence.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decode `flush` prefixed by any carried bytes. Invalid sequences become
    /// U+FFFD; an incomplete tail is kept for the next call.
    pub fn decode(&mut self, flush: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(flush);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    if let Ok(s) = std::str::from_utf8(valid) {
                        out.push_str(s);
                    }
                    match e.error_len() {
                        None => {
                            self.pending = tail.to_vec();
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is still held back, lossily.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ── Engine ─────────────────────────────────────────────────────────

/// Lifecycle phase of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Idle,
    Streaming,
    Done,
}

/// Mutable state of one streaming call.
#[derive(Debug)]
pub struct StreamState<C> {
    pub phase: StreamPhase,
    /// Concatenation of every emitted text fragment.
    pub text: String,
    /// The most recent successfully parsed chunk.
    pub last_chunk: Option<C>,
    pub last_event_id: Option<String>,
    pub last_event_name: Option<String>,
    /// Reconnection hint from a `retry:` frame.
    pub retry_hint: Option<Duration>,
    /// Recognized frames processed.
    pub frames: usize,
    /// `data` frames dropped because they failed to parse.
    pub skipped: usize,
}

impl<C> Default for StreamState<C> {
    fn default() -> Self {
        Self {
            phase: StreamPhase::Idle,
            text: String::new(),
            last_chunk: None,
            last_event_id: None,
            last_event_name: None,
            retry_hint: None,
            frames: 0,
            skipped: 0,
        }
    }
}

/// Incremental SSE parser and chunk accumulator.
pub struct SseEngine<C> {
    done_marker: String,
    error_prefix: String,
    decoder: Utf8Carry,
    line_buffer: String,
    state: StreamState<C>,
}

impl<C: StreamChunk> SseEngine<C> {
    pub fn new(done_marker: impl Into<String>, error_prefix: impl Into<String>) -> Self {
        Self {
            done_marker: done_marker.into(),
            error_prefix: error_prefix.into(),
            decoder: Utf8Carry::default(),
            line_buffer: String::new(),
            state: StreamState::default(),
        }
    }

    /// Engine using the configuration's sentinels.
    pub fn from_config(config: &ClientConfiguration) -> Self {
        Self::new(config.done_marker(), config.stream.error_prefix.clone())
    }

    pub fn state(&self) -> &StreamState<C> {
        &self.state
    }

    pub fn into_state(self) -> StreamState<C> {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state.phase == StreamPhase::Done
    }

    /// Process one flush. Returns the phase after processing.
    pub fn feed(&mut self, flush: &[u8], on_event: &mut impl FnMut(&StreamEvent)) -> StreamPhase {
        if self.is_done() {
            return StreamPhase::Done;
        }
        if self.state.phase == StreamPhase::Idle {
            self.state.phase = StreamPhase::Streaming;
            on_event(&StreamEvent::Start);
        }

        let text = self.decoder.decode(flush);
        self.line_buffer.push_str(&text);

        while let Some(newline) = self.line_buffer.find('\n') {
            let line: String = self.line_buffer.drain(..=newline).collect();
            self.process_line(&line, on_event);
            if self.is_done() {
                self.line_buffer.clear();
                break;
            }
        }
        self.state.phase
    }

    /// The transport completed. Parses any carried partial line and emits
    /// `Done` unless the sentinel already did.
    pub fn finish(&mut self, on_event: &mut impl FnMut(&StreamEvent)) {
        if self.is_done() {
            return;
        }
        let tail = self.decoder.finish();
        self.line_buffer.push_str(&tail);
        let remaining = std::mem::take(&mut self.line_buffer);
        for line in remaining.lines() {
            self.process_line(line, on_event);
            if self.is_done() {
                return;
            }
        }
        self.state.phase = StreamPhase::Done;
        on_event(&StreamEvent::Done);
    }

    fn process_line(&mut self, line: &str, on_event: &mut impl FnMut(&StreamEvent)) {
        let Some(frame) = parse_line(line, &self.error_prefix) else {
            return;
        };
        self.state.frames += 1;
        match frame.field {
            SseField::Data => self.process_data(frame.value, on_event),
            SseField::Id => self.state.last_event_id = Some(frame.value.to_string()),
            SseField::Event => self.state.last_event_name = Some(frame.value.to_string()),
            SseField::Retry => match frame.value.trim().parse::<u64>() {
                Ok(ms) => self.state.retry_hint = Some(Duration::from_millis(ms)),
                Err(_) => trace!("Ignoring non-numeric retry frame: {}", frame.value),
            },
            SseField::Error => {
                warn!("Stream error frame: {}", frame.value);
                on_event(&StreamEvent::Error(frame.value.to_string()));
            }
        }
    }

    fn process_data(&mut self, data: &str, on_event: &mut impl FnMut(&StreamEvent)) {
        if data.contains(self.done_marker.as_str()) {
            self.state.phase = StreamPhase::Done;
            on_event(&StreamEvent::Done);
            return;
        }
        if data.trim().is_empty() {
            return;
        }
        match serde_json::from_str::<C>(data) {
            Ok(chunk) => {
                let fragment = chunk.text().filter(|t| !t.is_empty()).map(str::to_owned);
                self.state.last_chunk = Some(chunk);
                if let Some(fragment) = fragment {
                    self.state.text.push_str(&fragment);
                    on_event(&StreamEvent::Text(fragment));
                }
            }
            Err(e) => {
                self.state.skipped += 1;
                warn!("Failed to parse SSE chunk: {e}, data: {data}");
            }
        }
    }
}

// ── Drivers ────────────────────────────────────────────────────────

/// Feed `flushes` into `engine` until the done sentinel, the end of the
/// transport stream, or cancellation.
///
/// # Errors
///
/// [`TransportError::Cancelled`] when `cancel` fires, or the transport
/// failure that interrupted the stream. The engine keeps whatever partial
/// state it reached.
pub async fn pump_sse<C: StreamChunk>(
    mut flushes: ByteStream,
    engine: &mut SseEngine<C>,
    cancel: &CancellationToken,
    on_event: &mut impl FnMut(&StreamEvent),
) -> Result<(), TransportError> {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            next = flushes.next() => next,
        };
        match next {
            Some(Ok(bytes)) => {
                trace!("SSE flush: {} bytes", bytes.len());
                if engine.feed(&bytes, on_event) == StreamPhase::Done {
                    debug!("Stream done sentinel received");
                    return Ok(());
                }
            }
            Some(Err(e)) => {
                on_event(&StreamEvent::Error(e.to_string()));
                return Err(e);
            }
            None => {
                engine.finish(on_event);
                debug!(
                    "Stream completed: {} frame(s), {} chars",
                    engine.state().frames,
                    engine.state().text.len()
                );
                return Ok(());
            }
        }
    }
}

/// Deliver raw byte chunks without decoding. Returns the total byte count.
///
/// # Errors
///
/// Same as [`pump_sse`].
pub async fn pump_bytes(
    mut flushes: ByteStream,
    cancel: &CancellationToken,
    on_event: &mut impl FnMut(&StreamEvent),
) -> Result<usize, TransportError> {
    let mut total = 0;
    let mut started = false;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            next = flushes.next() => next,
        };
        match next {
            Some(Ok(bytes)) => {
                if !started {
                    started = true;
                    on_event(&StreamEvent::Start);
                }
                total += bytes.len();
                on_event(&StreamEvent::Bytes(bytes));
            }
            Some(Err(e)) => {
                on_event(&StreamEvent::Error(e.to_string()));
                return Err(e);
            }
            None => {
                on_event(&StreamEvent::Done);
                return Ok(total);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct TextChunk {
        text: String,
    }

    impl StreamChunk for TextChunk {
        fn text(&self) -> Option<&str> {
            Some(&self.text)
        }
    }

    fn engine() -> SseEngine<TextChunk> {
        SseEngine::new("[DONE]", "error:")
    }

    fn run(engine: &mut SseEngine<TextChunk>, flushes: &[&[u8]]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let mut record = |e: &StreamEvent| events.push(e.clone());
        for flush in flushes {
            engine.feed(flush, &mut record);
        }
        engine.finish(&mut record);
        events
    }

    #[test]
    fn accumulates_fragments_and_stops_at_done() {
        let mut engine = engine();
        let events = run(
            &mut engine,
            &[b"data: {\"text\":\"He\"}\n\ndata: {\"text\":\"llo\"}\n\ndata: [DONE]\n\ndata: {\"text\":\"!\"}\n"],
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Start,
                StreamEvent::Text("He".into()),
                StreamEvent::Text("llo".into()),
                StreamEvent::Done,
            ]
        );
        assert_eq!(engine.state().text, "Hello");
        assert_eq!(engine.state().phase, StreamPhase::Done);
    }

    #[test]
    fn flushes_after_done_are_ignored() {
        let mut engine = engine();
        let events = run(
            &mut engine,
            &[b"data: [DONE]\n", b"data: {\"text\":\"late\"}\n"],
        );
        assert_eq!(events, vec![StreamEvent::Start, StreamEvent::Done]);
        assert!(engine.state().text.is_empty());
    }

    #[test]
    fn split_multibyte_character_decodes_once() {
        // "€" is E2 82 AC.
        let mut engine = engine();
        let first: &[u8] = b"data: {\"text\":\"\xE2\x82";
        let second: &[u8] = b"\xAC\"}\n";
        let events = run(&mut engine, &[first, second]);
        let texts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["€"]);
        assert_eq!(engine.state().text, "€");
    }

    #[test]
    fn lines_split_across_flushes_are_joined() {
        let mut engine = engine();
        let events = run(&mut engine, &[b"data: {\"te", b"xt\":\"ab\"}\n"]);
        assert!(events.contains(&StreamEvent::Text("ab".into())));
    }

    #[test]
    fn malformed_chunks_are_skipped() {
        let mut engine = engine();
        let events = run(
            &mut engine,
            &[b"data: {not json}\ndata: {\"text\":\"ok\"}\n"],
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Start,
                StreamEvent::Text("ok".into()),
                StreamEvent::Done
            ]
        );
        assert_eq!(engine.state().skipped, 1);
    }

    #[test]
    fn empty_fragments_are_control_frames() {
        let mut engine = engine();
        let events = run(&mut engine, &[b"data: {\"text\":\"\"}\n"]);
        assert_eq!(events, vec![StreamEvent::Start, StreamEvent::Done]);
        assert!(engine.state().last_chunk.is_some());
    }

    #[test]
    fn metadata_and_error_frames() {
        let mut engine = engine();
        let events = run(
            &mut engine,
            &[b"id: 7\r\nevent: delta\r\nretry: 1500\r\n: keep-alive\r\nerror: overloaded\r\n"],
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Start,
                StreamEvent::Error("overloaded".into()),
                StreamEvent::Done
            ]
        );
        let state = engine.state();
        assert_eq!(state.last_event_id.as_deref(), Some("7"));
        assert_eq!(state.last_event_name.as_deref(), Some("delta"));
        assert_eq!(state.retry_hint, Some(Duration::from_millis(1500)));
        assert_eq!(state.frames, 4);
    }

    #[test]
    fn trailing_line_without_newline_is_parsed_on_finish() {
        let mut engine = engine();
        let events = run(&mut engine, &[b"data: {\"text\":\"tail\"}"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::Start,
                StreamEvent::Text("tail".into()),
                StreamEvent::Done
            ]
        );
    }

    #[test]
    fn custom_done_marker() {
        let mut engine: SseEngine<serde_json::Value> = SseEngine::new("message_stop", "error:");
        let mut events = Vec::new();
        let mut record = |e: &StreamEvent| events.push(e.clone());
        engine.feed(
            b"data: {\"delta\":{\"text\":\"hi\"}}\ndata: {\"type\":\"message_stop\"}\n",
            &mut record,
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Start,
                StreamEvent::Text("hi".into()),
                StreamEvent::Done
            ]
        );
    }

    #[test]
    fn value_chunks_find_common_shapes() {
        let openai: serde_json::Value =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"a"}}]}"#).unwrap();
        let gemini: serde_json::Value = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"b"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(openai.text(), Some("a"));
        assert_eq!(gemini.text(), Some("b"));
        assert_eq!(serde_json::json!({"usage": {}}).text(), None);
    }

    #[test]
    fn parse_line_fields() {
        assert_eq!(
            parse_line("data:x", "error:"),
            Some(SseFrame {
                field: SseField::Data,
                value: "x"
            })
        );
        assert_eq!(
            parse_line("data:  two spaces", "error:").map(|f| f.value),
            Some(" two spaces")
        );
        assert_eq!(parse_line(": comment", "error:"), None);
        assert_eq!(parse_line("unknown: x", "error:"), None);
        assert_eq!(parse_line("error: x", ""), None);
    }

    #[test]
    fn utf8_carry_handles_invalid_and_incomplete() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.decode(b"a\xFFb"), "a\u{FFFD}b");
        assert_eq!(carry.decode(b"\xF0\x9F"), "");
        assert_eq!(carry.pending_len(), 2);
        assert_eq!(carry.decode(b"\x98\x80"), "😀");
        assert_eq!(carry.decode(b"\xE2"), "");
        assert_eq!(carry.finish(), "\u{FFFD}");
    }

    fn byte_stream(chunks: Vec<Result<Vec<u8>, TransportError>>) -> ByteStream {
        Box::pin(futures::stream::iter(chunks))
    }

    #[tokio::test]
    async fn pump_sse_drives_engine_to_done() {
        let mut engine = engine();
        let mut events = Vec::new();
        let flushes = byte_stream(vec![
            Ok(b"data: {\"text\":\"a\"}\n".to_vec()),
            Ok(b"data: {\"text\":\"b\"}\n".to_vec()),
        ]);
        pump_sse(
            flushes,
            &mut engine,
            &CancellationToken::new(),
            &mut |e: &StreamEvent| events.push(e.clone()),
        )
        .await
        .unwrap();
        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert_eq!(engine.state().text, "ab");
    }

    #[tokio::test]
    async fn pump_sse_reports_midstream_failure() {
        let mut engine = engine();
        let mut events = Vec::new();
        let flushes = byte_stream(vec![
            Ok(b"data: {\"text\":\"a\"}\n".to_vec()),
            Err(TransportError::DataProcessing("reset".into())),
        ]);
        let err = pump_sse(
            flushes,
            &mut engine,
            &CancellationToken::new(),
            &mut |e: &StreamEvent| events.push(e.clone()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransportError::DataProcessing(_)));
        assert!(!events.contains(&StreamEvent::Done));
        assert_eq!(engine.state().text, "a");
    }

    #[tokio::test]
    async fn pump_sse_observes_cancellation() {
        let mut engine = engine();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let flushes = byte_stream(vec![Ok(b"data: {\"text\":\"a\"}\n".to_vec())]);
        let err = pump_sse(flushes, &mut engine, &cancel, &mut |_: &StreamEvent| {})
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Cancelled);
        assert_eq!(engine.state().phase, StreamPhase::Idle);
    }

    #[tokio::test]
    async fn pump_bytes_delivers_raw_chunks() {
        let mut events = Vec::new();
        let flushes = byte_stream(vec![Ok(vec![0xFF, 0x00]), Ok(vec![0xE2])]);
        let total = pump_bytes(flushes, &CancellationToken::new(), &mut |e: &StreamEvent| {
            events.push(e.clone())
        })
        .await
        .unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            events,
            vec![
                StreamEvent::Start,
                StreamEvent::Bytes(vec![0xFF, 0x00]),
                StreamEvent::Bytes(vec![0xE2]),
                StreamEvent::Done,
            ]
        );
    }
}
