//! Error types for search API operations.
//!
//! Every failure produced by the client core is reported as one [`Error`]: a
//! structured value that carries the request context (endpoint, method,
//! operation name), the observed and accepted status codes, both bodies as
//! text and, when the server sent one, the parsed upstream [`ApiError`].
//!
//! # Error Categories
//!
//! | Kind | Origin | Retryable |
//! |------|--------|-----------|
//! | `MarshalFailure` | request body serialization | No |
//! | `InvalidRequest` | local precondition (body on GET, missing content type) | No |
//! | `TransportFailure` | connection, DNS, broken body stream | Yes |
//! | `Timeout` | client timeout or request deadline | Yes |
//! | `UnexpectedStatus` | status outside the accepted set | Depends on status |
//! | `UnmarshalFailure` | response decompression or JSON decoding | No |
//! | `Cancelled` | caller aborted a blocking wait | No |
//!
//! The [`ErrorKind`] decides which fields are meaningful: only
//! `UnexpectedStatus` and `UnmarshalFailure` carry a status and a response
//! body, only `UnexpectedStatus` may carry an [`ApiError`].
//!
//! # Examples
//!
//! ```
//! use docsearch_http::{Error, ErrorKind};
//!
//! let err = Error::new(ErrorKind::UnexpectedStatus, "/indexes/movies", "GET", "get_index")
//!     .with_status(404)
//!     .with_accepted_status(vec![200])
//!     .with_response_body("{\"message\":\"Index `movies` not found.\"}");
//!
//! assert_eq!(err.kind(), ErrorKind::UnexpectedStatus);
//! assert_eq!(err.status(), Some(404));
//! assert!(err.to_string().contains("/indexes/movies"));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Boxed error used for the underlying cause of an [`Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for search API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Discriminator for [`Error`].
///
/// The kind is stable: callers may match on it to decide whether a failure is
/// worth retrying on their side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The request body could not be serialized.
    MarshalFailure,
    /// The request violated a local precondition and was never sent.
    InvalidRequest,
    /// The request did not reach the server, or the response body broke off.
    TransportFailure,
    /// The client timeout or the request deadline expired.
    Timeout,
    /// The server answered with a status outside the accepted set.
    UnexpectedStatus,
    /// The response body could not be decompressed or decoded.
    UnmarshalFailure,
    /// The caller cancelled a blocking wait.
    Cancelled,
}

impl ErrorKind {
    /// Short, stable name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MarshalFailure => "marshal_failure",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UnexpectedStatus => "unexpected_status",
            ErrorKind::UnmarshalFailure => "unmarshal_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload returned by the search service for rejected requests.
///
/// Parsed opportunistically from non-accepted responses; every field is
/// optional because proxies and older servers may send partial bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human readable description of the failure.
    #[serde(default)]
    pub message: String,
    /// Machine readable error code (e.g. `index_not_found`).
    #[serde(default)]
    pub code: String,
    /// Error category (e.g. `invalid_request`).
    #[serde(default, rename = "type")]
    pub error_type: String,
    /// Link to the documentation for this error code.
    #[serde(default)]
    pub link: String,
}

/// Local precondition failures detected before a request is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// GET and HEAD requests may not carry a body.
    #[error("request body is not expected for {0} requests")]
    BodyNotAllowed(String),

    /// A body was supplied without a content type.
    #[error("request body without Content-Type is not allowed")]
    MissingContentType,
}

/// Structured error for every failure of the client core.
///
/// Built at the failure site with [`Error::new`] and the `with_*` methods,
/// then returned unchanged to the caller.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    endpoint: String,
    method: String,
    function: String,
    request_body: String,
    response_body: String,
    status: Option<u16>,
    accepted_status: Vec<u16>,
    api_error: Option<ApiError>,
    source: Option<BoxError>,
}

impl Error {
    /// Create an error of the given kind for one operation.
    pub fn new(
        kind: ErrorKind,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Error {
            kind,
            endpoint: endpoint.into(),
            method: method.into(),
            function: function.into(),
            request_body: String::new(),
            response_body: String::new(),
            status: None,
            accepted_status: Vec::new(),
            api_error: None,
            source: None,
        }
    }

    /// Attach the observed status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the accepted status codes of the request.
    #[must_use]
    pub fn with_accepted_status(mut self, accepted: Vec<u16>) -> Self {
        self.accepted_status = accepted;
        self
    }

    /// Attach the request body as text.
    #[must_use]
    pub fn with_request_body(mut self, body: impl Into<String>) -> Self {
        self.request_body = body.into();
        self
    }

    /// Attach the response body as text.
    ///
    /// Unmarshal failures always keep a non-empty body text, so an empty body
    /// is recorded as `(empty response body)` for that kind.
    #[must_use]
    pub fn with_response_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = body.into();
        if self.response_body.is_empty() && self.kind == ErrorKind::UnmarshalFailure {
            self.response_body = "(empty response body)".to_string();
        }
        self
    }

    /// Attach the parsed upstream error payload.
    #[must_use]
    pub fn with_api_error(mut self, api_error: ApiError) -> Self {
        self.api_error = Some(api_error);
        self
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Request path the error belongs to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// HTTP method of the failed request.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Operation name used for diagnostics.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Request body as text (empty when the request had none).
    pub fn request_body(&self) -> &str {
        &self.request_body
    }

    /// Response body as text (empty unless a response was read).
    pub fn response_body(&self) -> &str {
        &self.response_body
    }

    /// Status code observed, if a response was received.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Status codes the request accepted as success.
    pub fn accepted_status(&self) -> &[u16] {
        &self.accepted_status
    }

    /// Upstream error payload, if the server sent a parseable one.
    pub fn api_error(&self) -> Option<&ApiError> {
        self.api_error.as_ref()
    }

    /// Check if the failure is worth retrying by the caller.
    ///
    /// Returns `true` for transport failures, timeouts and unexpected
    /// statuses in the transient family (408, 425, 429, 502, 503, 504).
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::TransportFailure | ErrorKind::Timeout => true,
            ErrorKind::UnexpectedStatus => self
                .status
                .map(crate::client::is_retryable_status)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Check if an unmarshal failure came from the compression layer rather
    /// than from JSON decoding.
    #[must_use]
    pub fn is_decompression(&self) -> bool {
        self.kind == ErrorKind::UnmarshalFailure
            && self
                .source
                .as_deref()
                .and_then(|s| s.downcast_ref::<crate::encoding::EncodingError>())
                .map(|e| e.is_decompression())
                .unwrap_or(false)
    }

    fn write_context(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " (path \"{}\" with method \"{}\" in {})",
            self.endpoint, self.method, self.function
        )
    }
}

fn join_status(codes: &[u16]) -> String {
    codes
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::MarshalFailure => f.write_str("failed to marshal request body")?,
            ErrorKind::InvalidRequest => f.write_str("invalid request")?,
            ErrorKind::TransportFailure => f.write_str("failed to communicate with the server")?,
            ErrorKind::Timeout => f.write_str("request timed out")?,
            ErrorKind::Cancelled => f.write_str("operation cancelled")?,
            ErrorKind::UnmarshalFailure => f.write_str("failed to decode response body")?,
            ErrorKind::UnexpectedStatus => {
                let status = self
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string());
                write!(
                    f,
                    "unaccepted status code found: {} expected: [{}]",
                    status,
                    join_status(&self.accepted_status)
                )?;
            }
        }

        if let Some(source) = &self.source {
            write!(f, ": {}", source)?;
        }

        match (&self.api_error, self.kind) {
            (Some(api), _) => write!(
                f,
                ", upstream error: message \"{}\", code \"{}\", type \"{}\", link \"{}\"",
                api.message, api.code, api.error_type, api.link
            )?,
            (None, ErrorKind::UnexpectedStatus | ErrorKind::UnmarshalFailure) => {
                write!(f, ", response body: \"{}\"", self.response_body)?
            }
            _ => {}
        }
        if !self.request_body.is_empty() {
            write!(f, ", request body: \"{}\"", self.request_body)?;
        }

        self.write_context(f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}
