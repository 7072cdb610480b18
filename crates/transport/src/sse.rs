//! Incremental server-sent-events decoder.
//!
//! Bytes arrive in arbitrary chunks; [`SseDecoder::feed`] buffers partial
//! lines and returns every event completed by the chunk. Field handling
//! follows the EventSource rules the relay relies on:
//!
//! - `data:` lines accumulate, joined by `\n`
//! - `event:` sets the type (default `message`)
//! - `id:` sets the event id
//! - lines starting with `:` are comments (the relay's keep-alives)
//! - a blank line dispatches; an event with no data is discarded

use bytes::{Buf, BytesMut};

use crate::RelayEvent;

const DEFAULT_EVENT: &str = "message";

/// Stateful decoder for one event stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
    data: Vec<String>,
    event: Option<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk and returns the events it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RelayEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos);
            self.buf.advance(1);
            let line = match line.last() {
                Some(b'\r') => &line[..line.len() - 1],
                _ => &line[..],
            };
            let line = String::from_utf8_lossy(line);
            if let Some(event) = self.process_line(&line) {
                out.push(event);
            }
        }
        out
    }

    fn process_line(&mut self, line: &str) -> Option<RelayEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" if !value.contains('\0') => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<RelayEvent> {
        let event = self.event.take();
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(RelayEvent {
            id,
            event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_message_with_id() {
        let mut dec = SseDecoder::new();
        let events = dec.feed(b"id: 17\nevent: message\ndata: {\"from\":\"ab\"}\n\n");
        assert_eq!(
            events,
            vec![RelayEvent {
                id: Some("17".into()),
                event: "message".into(),
                data: "{\"from\":\"ab\"}".into(),
            }]
        );
    }

    #[test]
    fn handles_split_chunks_and_crlf() {
        let mut dec = SseDecoder::new();
        assert!(dec.feed(b"da").is_empty());
        assert!(dec.feed(b"ta: one\r\nda").is_empty());
        let events = dec.feed(b"ta: two\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "one\ntwo");
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].id, None);
    }

    #[test]
    fn skips_comments_and_empty_events() {
        let mut dec = SseDecoder::new();
        let events = dec.feed(b": keep-alive\n\nevent: heartbeat\n\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn multiple_events_in_one_chunk() {
        let mut dec = SseDecoder::new();
        let events = dec.feed(b"id: 1\ndata: a\n\nid: 2\ndata: b\n\n");
        let ids: Vec<_> = events.iter().map(|e| e.id.as_deref()).collect();
        assert_eq!(ids, vec![Some("1"), Some("2")]);
    }
}
