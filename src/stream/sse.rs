//! Server-Sent Events decoder.
//!
//! Incremental, line-oriented state machine over a [`ByteStream`]. Bytes are
//! accumulated in a `BytesMut` until a full `\n`-terminated line is present,
//! then each line moves the decoder through its states:
//!
//! 1. **Idle**: nothing accumulated; blank lines are skipped
//! 2. **Accumulating**: `event:` / `data:` fields collected for the next event
//! 3. **Dispatch**: a blank line completes the event, which is exposed through
//!    [`Decoder::event`] until the next call
//! 4. **Closed**: end of input or a read error; [`Decoder::next`] keeps
//!    returning `false`
//!
//! A stream that ends without a final blank line still dispatches the event
//! in progress, as long as it ended cleanly.
//!
//! # Examples
//!
//! ```
//! use bytes::Bytes;
//! use docsearch_http::stream::{ByteStream, Decoder, SseDecoder};
//!
//! # tokio_test::block_on(async {
//! let body: ByteStream = Box::pin(futures::stream::iter(vec![
//!     Ok(Bytes::from_static(b"event: chunk\ndata: hel")),
//!     Ok(Bytes::from_static(b"lo\ndata: world\n\n")),
//! ]));
//!
//! let mut decoder = SseDecoder::new(body);
//! assert!(decoder.next().await);
//! assert_eq!(decoder.event().event_type(), "chunk");
//! assert_eq!(decoder.event().data(), &b"hello\nworld"[..]);
//! assert!(!decoder.next().await);
//! # });
//! ```

use super::registry::{ByteStream, Decoder};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use std::io;

/// Longest line accepted before decoding fails, 16 MiB.
pub const MAX_LINE_SIZE: usize = 16 * 1024 * 1024;

/// One dispatched event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    event_type: String,
    data: Bytes,
}

impl Event {
    /// Create an event.
    pub fn new(event_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Event {
            event_type: event_type.into(),
            data: data.into(),
        }
    }

    /// Value of the last `event:` field, empty when none was sent.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// `data:` lines joined by `\n`.
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// Decoder for `text/event-stream` bodies.
pub struct SseDecoder {
    body: Option<ByteStream>,
    /// Bytes read but not yet split into lines
    buffer: BytesMut,
    /// Prefix of `buffer` already searched for `\n`
    scanned: usize,
    eof: bool,
    closed: bool,
    max_line: usize,

    event_type: String,
    data: BytesMut,
    has_data: bool,
    has_content: bool,

    event: Event,
    last_event_id: Option<String>,
    err: Option<io::Error>,
}

impl SseDecoder {
    /// Decode `body` with the default line limit.
    pub fn new(body: ByteStream) -> Self {
        SseDecoder {
            body: Some(body),
            buffer: BytesMut::with_capacity(8192),
            scanned: 0,
            eof: false,
            closed: false,
            max_line: MAX_LINE_SIZE,
            event_type: String::new(),
            data: BytesMut::new(),
            has_data: false,
            has_content: false,
            event: Event::default(),
            last_event_id: None,
            err: None,
        }
    }

    /// Fail lines longer than `max_line` bytes.
    #[must_use]
    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    /// Value of the last `id:` field seen.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Read the next line without its terminator. `None` at end of input.
    async fn next_line(&mut self) -> io::Result<Option<BytesMut>> {
        loop {
            if let Some(pos) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
                let end = self.scanned + pos;
                let mut line = self.buffer.split_to(end + 1);
                line.truncate(end);
                self.scanned = 0;
                return self.checked(line).map(Some);
            }
            self.scanned = self.buffer.len();

            if self.buffer.len() > self.max_line {
                return Err(line_too_long(self.max_line));
            }

            if self.eof {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                self.scanned = 0;
                let line = self.buffer.split();
                return self.checked(line).map(Some);
            }

            let chunk = match self.body.as_mut() {
                Some(body) => body.next().await,
                None => None,
            };
            match chunk {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e),
                None => self.eof = true,
            }
        }
    }

    fn checked(&self, mut line: BytesMut) -> io::Result<BytesMut> {
        if line.len() > self.max_line {
            return Err(line_too_long(self.max_line));
        }
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Ok(line)
    }

    /// Apply one line. Returns `true` when it completed an event.
    fn process_line(&mut self, line: &[u8]) -> bool {
        if line.is_empty() {
            if !self.has_content {
                return false;
            }
            self.dispatch();
            return true;
        }

        if line[0] == b':' {
            return false;
        }

        let (field, value) = match line.iter().position(|b| *b == b':') {
            Some(colon) => {
                let mut value = &line[colon + 1..];
                if value.first() == Some(&b' ') {
                    value = &value[1..];
                }
                (&line[..colon], value)
            }
            None => {
                // bare field name, empty value
                if line == b"event" {
                    self.event_type.clear();
                    self.has_content = true;
                }
                return false;
            }
        };

        match field {
            b"event" => {
                self.event_type = String::from_utf8_lossy(value).into_owned();
                self.has_content = true;
            }
            b"data" => {
                if self.has_data {
                    self.data.put_u8(b'\n');
                }
                self.data.extend_from_slice(value);
                self.has_data = true;
                self.has_content = true;
            }
            b"id" => {
                if !value.contains(&0) {
                    self.last_event_id = Some(String::from_utf8_lossy(value).into_owned());
                }
            }
            _ => {}
        }
        false
    }

    fn dispatch(&mut self) {
        self.event = Event {
            event_type: std::mem::take(&mut self.event_type),
            data: self.data.split().freeze(),
        };
        self.has_data = false;
        self.has_content = false;
    }

    fn finish(&mut self, err: Option<io::Error>) {
        if let Some(err) = &err {
            tracing::debug!(error = %err, "event stream decoding stopped");
        }
        self.err = err;
        self.closed = true;
        self.body = None;
    }
}

fn line_too_long(max_line: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("event stream line exceeds {} bytes", max_line),
    )
}

#[async_trait]
impl Decoder for SseDecoder {
    async fn next(&mut self) -> bool {
        if self.closed {
            return false;
        }

        loop {
            match self.next_line().await {
                Ok(Some(line)) => {
                    if self.process_line(&line) {
                        return true;
                    }
                }
                Ok(None) => {
                    let flushed = self.has_content;
                    if flushed {
                        self.dispatch();
                    }
                    self.finish(None);
                    return flushed;
                }
                Err(e) => {
                    self.finish(Some(e));
                    return false;
                }
            }
        }
    }

    fn event(&self) -> &Event {
        &self.event
    }

    fn err(&self) -> Option<&io::Error> {
        self.err.as_ref()
    }

    fn take_err(&mut self) -> Option<io::Error> {
        self.err.take()
    }

    fn close(&mut self) {
        self.closed = true;
        self.body = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn decoder(chunks: Vec<&'static [u8]>) -> SseDecoder {
        let chunks: Vec<io::Result<Bytes>> =
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))).collect();
        SseDecoder::new(Box::pin(futures::stream::iter(chunks)))
    }

    async fn collect(decoder: &mut SseDecoder) -> Vec<(String, String)> {
        let mut events = Vec::new();
        while decoder.next().await {
            let event = decoder.event();
            events.push((
                event.event_type().to_string(),
                String::from_utf8(event.data().to_vec()).unwrap(),
            ));
        }
        events
    }

    #[tokio::test]
    async fn test_two_events() {
        let mut d = decoder(vec![
            b"event: message\ndata: {\"key\":\"value\"}\n\nevent: done\ndata: [DONE]\n\n",
        ]);
        let events = collect(&mut d).await;
        assert_eq!(
            events,
            vec![
                ("message".to_string(), "{\"key\":\"value\"}".to_string()),
                ("done".to_string(), "[DONE]".to_string()),
            ]
        );
        assert!(d.err().is_none());
    }

    #[tokio::test]
    async fn test_multi_line_data() {
        let mut d = decoder(vec![b"event: chunk\ndata: hello\ndata: world\n\n"]);
        let events = collect(&mut d).await;
        assert_eq!(events, vec![("chunk".to_string(), "hello\nworld".to_string())]);
    }

    #[tokio::test]
    async fn test_missing_trailing_blank_line_is_flushed() {
        let mut d = decoder(vec![b"event: message\ndata: {\"final\":true}\n"]);
        let events = collect(&mut d).await;
        assert_eq!(events, vec![("message".to_string(), "{\"final\":true}".to_string())]);
        assert!(d.err().is_none());

        let mut d = decoder(vec![b"data: no newline at all"]);
        let events = collect(&mut d).await;
        assert_eq!(events, vec![(String::new(), "no newline at all".to_string())]);
    }

    #[tokio::test]
    async fn test_frames_split_mid_line() {
        let mut d = decoder(vec![b"ev", b"ent: a\nda", b"ta: 1\n", b"\n", b"data: 2\n\n"]);
        let events = collect(&mut d).await;
        assert_eq!(
            events,
            vec![("a".to_string(), "1".to_string()), (String::new(), "2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_comments_blank_lines_and_ignored_fields() {
        let mut d = decoder(vec![
            b"\n\n: keep-alive\nretry: 1000\nid: 7\nfoo: bar\ndata:x\n\n: trailing comment\n\n",
        ]);
        let events = collect(&mut d).await;
        assert_eq!(events, vec![(String::new(), "x".to_string())]);
        assert_eq!(d.last_event_id(), Some("7"));
    }

    #[tokio::test]
    async fn test_only_one_leading_space_is_stripped() {
        let mut d = decoder(vec![b"data:  indented\n\n"]);
        let events = collect(&mut d).await;
        assert_eq!(events[0].1, " indented");
    }

    #[tokio::test]
    async fn test_bare_event_field_clears_type() {
        let mut d = decoder(vec![b"event: first\nevent\n\ndata\n\n"]);
        let events = collect(&mut d).await;
        // `event` alone dispatches an empty event; `data` alone is ignored
        assert_eq!(events, vec![(String::new(), String::new())]);
    }

    #[tokio::test]
    async fn test_crlf_lines() {
        let mut d = decoder(vec![b"event: message\r\ndata: crlf\r\n\r\n"]);
        let events = collect(&mut d).await;
        assert_eq!(events, vec![("message".to_string(), "crlf".to_string())]);
    }

    #[tokio::test]
    async fn test_read_error_is_retained_and_nothing_flushed() {
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: partial\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut d = SseDecoder::new(Box::pin(futures::stream::iter(chunks)));
        assert!(!d.next().await);
        assert_eq!(d.err().map(|e| e.kind()), Some(io::ErrorKind::ConnectionReset));
        assert!(!d.next().await);
    }

    #[tokio::test]
    async fn test_line_limit() {
        let mut d = decoder(vec![b"data: 0123456789", b"0123456789\n\n"]).with_max_line(8);
        assert!(!d.next().await);
        assert_eq!(d.err().map(|e| e.kind()), Some(io::ErrorKind::InvalidData));
    }

    #[tokio::test]
    async fn test_large_line_within_limit() {
        let payload = "x".repeat(1024 * 1024);
        let body = format!("data: {}\n\n", payload);
        let chunks: Vec<io::Result<Bytes>> = body
            .into_bytes()
            .chunks(4096)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let mut d = SseDecoder::new(Box::pin(futures::stream::iter(chunks)));
        assert!(d.next().await);
        assert_eq!(d.event().data().len(), payload.len());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_drops_source_once() {
        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let guard = DropCounter(drops.clone());
        let body = futures::stream::iter(vec![Ok(Bytes::from_static(b"data: 1\n\n"))]).map(
            move |chunk: io::Result<Bytes>| {
                let _ = &guard;
                chunk
            },
        );
        let mut d = SseDecoder::new(Box::pin(body));
        d.close();
        d.close();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(!d.next().await);
        assert!(d.err().is_none());
    }
}
