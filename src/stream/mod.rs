//! Incremental decoding of streaming responses.
//!
//! Streaming endpoints answer with `text/event-stream` bodies whose `data:`
//! payloads are JSON objects, terminated by a literal `[DONE]` payload. The
//! layers are:
//!
//! ```text
//! stream/
//! ├── sse      - SseDecoder: bytes -> (event type, data) pairs
//! ├── registry - Decoder trait and media type -> decoder selection
//! └── typed    - Stream<T>: events -> typed values, [DONE] handling
//! ```
//!
//! # Examples
//!
//! ```
//! use bytes::Bytes;
//! use docsearch_http::stream::{ByteStream, Stream};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Chunk {
//!     text: String,
//! }
//!
//! # tokio_test::block_on(async {
//! let body: ByteStream = Box::pin(futures::stream::iter(vec![Ok(Bytes::from_static(
//!     b"data: {\"text\":\"hel\"}\n\ndata: {\"text\":\"lo\"}\n\ndata: [DONE]\n\n",
//! ))]));
//!
//! let mut stream = Stream::<Chunk>::from_sse(body);
//! let mut text = String::new();
//! while stream.next().await {
//!     if let Some(chunk) = stream.current() {
//!         text.push_str(&chunk.text);
//!     }
//! }
//! assert!(stream.err().is_none());
//! assert_eq!(text, "hello");
//! # });
//! ```

mod registry;
mod sse;
mod typed;

pub use registry::{ByteStream, Decoder, DecoderRegistry, SSE_MEDIA_TYPE};
pub use sse::{Event, SseDecoder, MAX_LINE_SIZE};
pub use typed::{Stream, DONE_SENTINEL};
