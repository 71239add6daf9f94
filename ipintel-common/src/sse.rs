//! Server-Sent Events (SSE) decoding
//!
//! Turns a chunked `text/event-stream` body into discrete events. Chunk
//! boundaries may fall anywhere, including inside a line.

use futures::stream::{Stream, StreamExt};

use crate::{Error, Result};

/// One dispatched event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, if the server named the event
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
    pub id: Option<String>,
}

/// Incremental event-stream parser
#[derive(Debug, Default)]
pub struct SseDecoder {
    line_buf: Vec<u8>,
    data_lines: Vec<String>,
    event: Option<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the events completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let mut line = std::mem::take(&mut self.line_buf);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if let Some(event) = self.process_line(&String::from_utf8_lossy(&line)) {
                    events.push(event);
                }
            } else {
                self.line_buf.push(byte);
            }
        }
        events
    }

    /// Flush at end of body
    ///
    /// A final event that was not terminated by a blank line is still
    /// delivered when it carries data.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            let line = String::from_utf8_lossy(&line).trim_end_matches('\r').to_string();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            // comment / keep-alive
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data_lines.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let id = self.id.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data_lines).join("\n");
        Some(SseEvent { event, data, id })
    }
}

/// Decode a byte-chunk stream into events
///
/// The returned stream ends after the first transport error.
pub fn decode<S, B, E>(body: S) -> impl Stream<Item = Result<SseEvent>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    async_stream::try_stream! {
        let mut decoder = SseDecoder::new();
        let mut body = Box::pin(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(Into::<Error>::into)?;
            for event in decoder.feed(chunk.as_ref()) {
                yield event;
            }
        }
        if let Some(event) = decoder.finish() {
            yield event;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: {\"status\":\"processing\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"status\":\"processing\"}");
        assert!(events[0].event.is_none());
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: progress\r\nda").is_empty());
        assert!(decoder.feed(b"ta: part").is_empty());
        let events = decoder.feed(b"ial\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("progress"));
        assert_eq!(events[0].data, "partial");
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": heartbeat\n\ndata: a\ndata:b\nid: 3\nretry: 100\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a\nb");
        assert_eq!(events[0].id.as_deref(), Some("3"));
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: tail").is_empty());
        let event = decoder.finish().expect("tail event");
        assert_eq!(event.data, "tail");
        assert!(decoder.finish().is_none());
    }

    #[tokio::test]
    async fn test_decode_stream() {
        let chunks: Vec<std::result::Result<&'static [u8], Error>> = vec![
            Ok(&b"data: one\n\nda"[..]),
            Ok(&b"ta: two\n\n"[..]),
        ];
        let events: Vec<_> = decode(futures::stream::iter(chunks)).collect().await;
        let data: Vec<_> = events.into_iter().map(|e| e.unwrap().data).collect();
        assert_eq!(data, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_decode_stops_on_transport_error() {
        let chunks: Vec<std::result::Result<&'static [u8], Error>> = vec![
            Ok(&b"data: one\n\n"[..]),
            Err(Error::Internal("connection reset".to_string())),
            Ok(&b"data: never\n\n"[..]),
        ];
        let events: Vec<_> = decode(futures::stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(events[1].is_err());
    }
}
