//! Decoder selection by response media type.

use super::sse::{Event, SseDecoder};
use crate::client::media_type;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::pin::Pin;

/// Media type of Server-Sent Events bodies.
pub const SSE_MEDIA_TYPE: &str = "text/event-stream";

/// Body of a streaming response as a sequence of byte chunks.
pub type ByteStream = Pin<Box<dyn futures::Stream<Item = io::Result<Bytes>> + Send>>;

/// An event decoder over a [`ByteStream`].
///
/// Decoders are pull-based: [`Decoder::next`] reads until one event is
/// complete and exposes it through [`Decoder::event`] until the next call.
#[async_trait]
pub trait Decoder: Send {
    /// Advance to the next event. Returns `false` at end of input or on error.
    async fn next(&mut self) -> bool;

    /// The event produced by the last successful [`Decoder::next`].
    fn event(&self) -> &Event;

    /// The error that ended decoding, if any.
    fn err(&self) -> Option<&io::Error>;

    /// Take the error that ended decoding, leaving `None` behind.
    ///
    /// Decoders that own their error should return it as-is so its source
    /// chain survives. The default rebuilds it from [`Decoder::err`].
    fn take_err(&mut self) -> Option<io::Error> {
        self.err().map(|e| io::Error::new(e.kind(), e.to_string()))
    }

    /// Release the underlying byte source. Calling it again is a no-op.
    fn close(&mut self);
}

type Factory = Box<dyn Fn(ByteStream) -> Box<dyn Decoder> + Send + Sync>;

fn sse_decoder(body: ByteStream) -> Box<dyn Decoder> {
    Box::new(SseDecoder::new(body))
}

/// Maps response media types to decoder constructors.
///
/// Built once per client. Lookups ignore media type parameters such as
/// `charset`, and fall back to the SSE decoder when the type is missing or
/// unknown: streaming endpoints always use SSE framing even when a proxy
/// rewrites the header.
pub struct DecoderRegistry {
    factories: HashMap<String, Factory>,
}

impl DecoderRegistry {
    /// Registry with the SSE decoder registered for `text/event-stream`.
    pub fn new() -> Self {
        let mut registry = DecoderRegistry {
            factories: HashMap::new(),
        };
        registry.register(SSE_MEDIA_TYPE, sse_decoder);
        registry
    }

    /// Register `factory` for `content_type`, replacing an earlier entry.
    pub fn register<F>(&mut self, content_type: &str, factory: F)
    where
        F: Fn(ByteStream) -> Box<dyn Decoder> + Send + Sync + 'static,
    {
        let key = media_type(content_type).unwrap_or_default();
        self.factories.insert(key, Box::new(factory));
    }

    /// Check whether a decoder is registered for `content_type`.
    pub fn contains(&self, content_type: &str) -> bool {
        media_type(content_type)
            .map(|key| self.factories.contains_key(&key))
            .unwrap_or(false)
    }

    /// Build the decoder for a response with the given `Content-Type`.
    pub fn decoder_for(&self, content_type: Option<&str>, body: ByteStream) -> Box<dyn Decoder> {
        let factory = content_type
            .and_then(media_type)
            .and_then(|key| self.factories.get(&key));
        match factory {
            Some(factory) => factory(body),
            None => sse_decoder(body),
        }
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("DecoderRegistry")
            .field("media_types", &types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn body(data: &'static [u8]) -> ByteStream {
        Box::pin(futures::stream::iter(vec![Ok(Bytes::from_static(data))]))
    }

    /// Emits every chunk as one event of type `line`.
    struct ChunkDecoder {
        body: ByteStream,
        event: Event,
    }

    #[async_trait]
    impl Decoder for ChunkDecoder {
        async fn next(&mut self) -> bool {
            use futures::StreamExt;
            match self.body.next().await {
                Some(Ok(chunk)) => {
                    self.event = Event::new("line", chunk);
                    true
                }
                _ => false,
            }
        }

        fn event(&self) -> &Event {
            &self.event
        }

        fn err(&self) -> Option<&io::Error> {
            None
        }

        fn close(&mut self) {}
    }

    #[tokio::test]
    async fn test_default_is_sse() {
        let registry = DecoderRegistry::new();
        assert!(registry.contains("text/event-stream; charset=utf-8"));

        for content_type in [None, Some("application/octet-stream"), Some("")] {
            let mut decoder = registry.decoder_for(content_type, body(b"event: a\ndata: 1\n\n"));
            assert!(decoder.next().await);
            assert_eq!(decoder.event().event_type(), "a");
        }
    }

    #[tokio::test]
    async fn test_registered_decoder_is_selected_ignoring_charset() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();

        let mut registry = DecoderRegistry::new();
        registry.register("application/x-ndjson", move |body| -> Box<dyn Decoder> {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(ChunkDecoder {
                body,
                event: Event::default(),
            })
        });

        let mut decoder = registry.decoder_for(
            Some("Application/X-NDJSON; charset=utf-8"),
            body(b"{\"a\":1}"),
        );
        assert!(decoder.next().await);
        assert_eq!(decoder.event().event_type(), "line");
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }
}
