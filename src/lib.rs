#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! ## Overview
//!
//! The crate is the request-execution layer of a document-search SDK. Resource
//! wrappers (indexes, documents, settings, keys, ...) describe each call as a
//! [`Request`] and hand it to [`SearchClient`], which:
//!
//! 1. **Prepares** the URL, query string and serialized body
//! 2. **Encodes** the body under the configured gzip/deflate/brotli scheme
//! 3. **Retries** responses whose status is in the [`RetryPolicy`] set
//! 4. **Classifies** failures into one structured [`Error`]
//! 5. **Decodes** the (possibly compressed) JSON response
//!
//! Streaming endpoints are decoded incrementally from Server-Sent Events
//! into a typed [`Stream`], and asynchronous server tasks can be awaited with
//! the task poller.
//!
//! ## Error Kinds
//!
//! | Kind | Meaning |
//! |------|---------|
//! | [`ErrorKind::MarshalFailure`] | request body could not be serialized |
//! | [`ErrorKind::InvalidRequest`] | local precondition failed, nothing sent |
//! | [`ErrorKind::TransportFailure`] | connection or body stream failure |
//! | [`ErrorKind::Timeout`] | client timeout or request deadline |
//! | [`ErrorKind::UnexpectedStatus`] | status outside the accepted set |
//! | [`ErrorKind::UnmarshalFailure`] | response could not be decompressed or decoded |
//! | [`ErrorKind::Cancelled`] | a task wait was cancelled |
//!
//! ## Module Structure
//!
//! - **[types]** - Request descriptors and task models
//! - **[error]** - Error types and result handling
//! - **[client]** - Request executor, retry policy and task poller
//! - **[encoding]** - Content encoding and resource pools
//! - **[stream]** - SSE decoding and typed streams

pub mod client;
pub mod encoding;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{ClientConfig, RetryPolicy, SearchClient};
pub use encoding::{CompressionLevel, EncodingConfig, Scheme};
pub use error::{ApiError, Error, ErrorKind, Result};
pub use stream::Stream;
pub use types::{Request, RequestBody, SerializeBody, Task, TaskInfo, TaskStatus};
