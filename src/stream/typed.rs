//! Typed values over a decoded event stream.
//!
//! [`Stream<T>`] pulls events from a [`Decoder`], decodes each payload as
//! JSON into a fresh `T` and stops at the `[DONE]` sentinel. It is
//! single-pass: once [`Stream::next`] has returned `false` it never yields
//! again.

use super::registry::{ByteStream, Decoder};
use super::sse::SseDecoder;
use crate::error::{Error, ErrorKind, Result};
use serde::de::DeserializeOwned;
use std::fmt;

/// Payload that marks the logical end of a stream.
pub const DONE_SENTINEL: &[u8] = b"[DONE]";

/// A lazy, forward-only sequence of `T` decoded from events.
pub struct Stream<T> {
    decoder: Box<dyn Decoder>,
    current: Option<T>,
    err: Option<Error>,
    /// `[DONE]` was seen; remaining events are skipped
    done: bool,
    /// `next` returned `false`
    finished: bool,
    endpoint: String,
    method: String,
    function: String,
}

impl<T: DeserializeOwned> Stream<T> {
    /// Wrap `decoder`.
    pub fn new(decoder: Box<dyn Decoder>) -> Self {
        Stream {
            decoder,
            current: None,
            err: None,
            done: false,
            finished: false,
            endpoint: String::new(),
            method: String::new(),
            function: String::new(),
        }
    }

    /// Decode `body` as Server-Sent Events.
    pub fn from_sse(body: ByteStream) -> Self {
        Self::new(Box::new(SseDecoder::new(body)))
    }

    /// Set the request context reported in errors.
    #[must_use]
    pub fn with_request(
        mut self,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        self.endpoint = endpoint.into();
        self.method = method.into();
        self.function = function.into();
        self
    }

    /// Advance to the next value.
    ///
    /// Returns `false` on a clean end of stream (including after `[DONE]`)
    /// or on error; [`Stream::err`] tells the two apart.
    pub async fn next(&mut self) -> bool {
        self.current = None;
        if self.finished {
            return false;
        }

        loop {
            if !self.decoder.next().await {
                if let Some(source) = self.decoder.take_err() {
                    let error = self.error(ErrorKind::TransportFailure).with_source(source);
                    self.err = Some(error);
                }
                self.finish();
                return false;
            }

            if self.done {
                continue;
            }

            let parsed = {
                let payload = self.decoder.event().data().trim_ascii();
                if payload == DONE_SENTINEL {
                    None
                } else {
                    Some(
                        serde_json::from_slice::<T>(payload)
                            .map_err(|e| (e, String::from_utf8_lossy(payload).into_owned())),
                    )
                }
            };

            match parsed {
                None => self.done = true,
                Some(Ok(value)) => {
                    self.current = Some(value);
                    return true;
                }
                Some(Err((source, text))) => {
                    let error = self
                        .error(ErrorKind::UnmarshalFailure)
                        .with_response_body(text)
                        .with_source(source);
                    self.err = Some(error);
                    self.finish();
                    return false;
                }
            }
        }
    }

    /// The value produced by the last successful [`Stream::next`].
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Take ownership of the current value.
    pub fn take_current(&mut self) -> Option<T> {
        self.current.take()
    }

    /// The terminal error, `None` after a clean end.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Release the decoder and the response body. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.finish();
    }

    /// Convert into a [`futures::Stream`] of results.
    ///
    /// A terminal error is yielded as the last item.
    pub fn into_stream(self) -> impl futures::Stream<Item = Result<T>> + Send
    where
        T: Send + 'static,
    {
        futures::stream::unfold(Some(self), |state| async move {
            let mut stream = state?;
            if stream.next().await {
                let value = stream.take_current()?;
                Some((Ok(value), Some(stream)))
            } else {
                stream.err.take().map(|e| (Err(e), None))
            }
        })
    }

    fn finish(&mut self) {
        self.finished = true;
        self.current = None;
        self.decoder.close();
    }

    fn error(&self, kind: ErrorKind) -> Error {
        Error::new(kind, &self.endpoint, &self.method, &self.function)
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("endpoint", &self.endpoint)
            .field("done", &self.done)
            .field("finished", &self.finished)
            .field("err", &self.err)
            .finish()
    }
}
