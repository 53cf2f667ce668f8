//! Server-Sent Events parsing shared by the streaming providers.
//!
//! ```text
//! event: content_block_delta
//! data: {"delta": {"text": "Hel"}}
//!
//! data: [DONE]
//! ```

use std::collections::VecDeque;
use std::mem;

use futures::{StreamExt as _, stream};
use nexus_core::{Error, FragmentStream, Result};
use reqwest::Response;

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// The `event:` field, if present.
    pub event_type: Option<String>,
    /// The `data:` field(s), joined with `\n`.
    pub data: String,
}

impl SseEvent {
    /// Whether this event is the `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incremental SSE parser fed with raw bytes.
///
/// Bytes are buffered until a full line is available, so multi-byte characters
/// split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseLineParser {
    line_buffer: Vec<u8>,
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl SseLineParser {
    /// Create a new incremental SSE parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for byte in chunk {
            if *byte == b'\n' {
                let raw = mem::take(&mut self.line_buffer);
                let line = String::from_utf8_lossy(&raw);
                if let Some(event) = self.process_line(line.strip_suffix('\r').unwrap_or(&line)) {
                    events.push(event);
                }
            } else {
                self.line_buffer.push(*byte);
            }
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.line_buffer.is_empty() {
            let raw = mem::take(&mut self.line_buffer);
            let line = String::from_utf8_lossy(&raw).into_owned();
            if let Some(event) = self.process_line(line.strip_suffix('\r').unwrap_or(&line)) {
                return Some(event);
            }
        }
        self.take_event()
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() {
            self.event_type = None;
            return None;
        }
        Some(SseEvent {
            event_type: self.event_type.take(),
            data: mem::take(&mut self.data_lines).join("\n"),
        })
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.take_event();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "data" => self.data_lines.push(value.to_owned()),
            "event" => self.event_type = Some(value.to_owned()),
            _ => {}
        }
        None
    }
}

/// Turns one SSE event into text: `Ok(None)` skips it, `Err` ends the stream.
pub type TextExtractor = fn(&SseEvent) -> Result<Option<String>>;

/// Fail with the response body when the status is not a success.
///
/// # Errors
/// Returns `Error::Provider` carrying the status and body text.
pub async fn ensure_success(response: Response, provider: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_owned());
    Err(Error::Provider(format!("{provider} API error {status}: {error_text}")))
}

/// Adapt a streaming HTTP response into a stream of text fragments.
pub fn text_stream(response: Response, extract: TextExtractor) -> FragmentStream {
    let bytes = response.bytes_stream().boxed();
    let initial = (bytes, SseLineParser::new(), VecDeque::<Result<String>>::new(), false);

    Box::pin(stream::unfold(
        initial,
        move |(mut bytes, mut parser, mut pending, mut finished)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (bytes, parser, pending, finished)));
                }
                if finished {
                    return None;
                }
                let events = match bytes.next().await {
                    Some(Ok(chunk)) => parser.push(&chunk),
                    Some(Err(err)) => {
                        tracing::error!("Model stream read error: {}", err);
                        finished = true;
                        pending.push_back(Err(Error::Request(err)));
                        continue;
                    }
                    None => {
                        finished = true;
                        parser.flush().into_iter().collect()
                    }
                };
                for event in events {
                    if event.is_done() {
                        finished = true;
                        break;
                    }
                    match extract(&event) {
                        Ok(Some(text)) if !text.is_empty() => pending.push_back(Ok(text)),
                        Ok(_) => {}
                        Err(err) => {
                            finished = true;
                            pending.push_back(Err(err));
                            break;
                        }
                    }
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(text: &str) -> Vec<SseEvent> {
        let mut parser = SseLineParser::new();
        let mut events = parser.push(text.as_bytes());
        events.extend(parser.flush());
        events
    }

    #[test]
    fn test_parses_events_and_types() {
        let events = parse_all("event: ping\ndata: {}\n\ndata: hello\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type.as_deref(), Some("ping"));
        assert_eq!(events[1].data, "hello");
        assert!(events[1].event_type.is_none());
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let events = parse_all(": keepalive\ndata: one\ndata:two\n\n");
        assert_eq!(events, vec![SseEvent { event_type: None, data: "one\ntwo".to_owned() }]);
    }

    #[test]
    fn test_crlf_and_trailing_event() {
        let events = parse_all("data: a\r\n\r\ndata: b");
        let data: Vec<_> = events.iter().map(|event| event.data.as_str()).collect();
        assert_eq!(data, vec!["a", "b"]);
    }

    #[test]
    fn test_split_multibyte_character() {
        let bytes = "data: héllo\n\n".as_bytes();
        let mut parser = SseLineParser::new();
        let mut events = Vec::new();
        for chunk in bytes.chunks(1) {
            events.extend(parser.push(chunk));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "héllo");
    }

    #[test]
    fn test_done_sentinel() {
        let events = parse_all("data: [DONE]\n\n");
        assert!(events[0].is_done());
    }
}
