//! Request descriptors handed to the executor.
//!
//! A [`Request`] is built per call by a resource wrapper and passed by value
//! to [`SearchClient::execute`](crate::SearchClient::execute); the executor
//! never mutates it.
//!
//! # Examples
//!
//! ```
//! use docsearch_http::Request;
//! use serde_json::json;
//!
//! let request = Request::post("/indexes/movies/search")
//!     .with_json(json!({ "q": "dune", "limit": 5 }))
//!     .with_accepted_status([200])
//!     .with_function("search");
//!
//! assert_eq!(request.path(), "/indexes/movies/search");
//! assert_eq!(request.content_type(), Some("application/json"));
//! ```

use crate::error::BoxError;
use bytes::Bytes;
use http::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// `application/json` content type.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Capability of producing a request body.
///
/// Every [`serde::Serialize`] type has it through a blanket implementation, so
/// a type's own `Serialize` impl is respected. Types that are not `Serialize`
/// (streaming CSV writers, pre-rendered NDJSON, ...) can implement it directly.
pub trait SerializeBody: Send + Sync {
    /// Write the body bytes to `out`.
    fn serialize_body(&self, out: &mut Vec<u8>) -> Result<(), BoxError>;
}

impl<T> SerializeBody for T
where
    T: Serialize + Send + Sync,
{
    fn serialize_body(&self, out: &mut Vec<u8>) -> Result<(), BoxError> {
        serde_json::to_writer(out, self).map_err(Into::into)
    }
}

/// Body of a request.
pub enum RequestBody {
    /// Bytes sent as-is (still subject to content encoding).
    Raw(Bytes),
    /// Value serialized at send time.
    Serialize(Box<dyn SerializeBody>),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Raw(bytes) => f.debug_tuple("Raw").field(&bytes.len()).finish(),
            RequestBody::Serialize(_) => f.write_str("Serialize(..)"),
        }
    }
}

/// Description of one API call.
#[derive(Debug)]
pub struct Request {
    path: String,
    method: Method,
    content_type: Option<String>,
    body: Option<RequestBody>,
    query: BTreeMap<String, String>,
    accepted_status: Vec<u16>,
    function: String,
    timeout: Option<Duration>,
}

impl Request {
    /// Create a request for `path` relative to the client host.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Request {
            path: path.into(),
            method,
            content_type: None,
            body: None,
            query: BTreeMap::new(),
            accepted_status: Vec::new(),
            function: String::new(),
            timeout: None,
        }
    }

    /// `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT` request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `PATCH` request.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Set the content type of the body.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Attach a body serialized at send time. The content type is left as is.
    #[must_use]
    pub fn with_body<B: SerializeBody + 'static>(mut self, body: B) -> Self {
        self.body = Some(RequestBody::Serialize(Box::new(body)));
        self
    }

    /// Attach a JSON body and set `Content-Type: application/json`.
    #[must_use]
    pub fn with_json<B: SerializeBody + 'static>(self, body: B) -> Self {
        self.with_content_type(CONTENT_TYPE_JSON).with_body(body)
    }

    /// Attach raw body bytes.
    #[must_use]
    pub fn with_raw_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Raw(body.into()));
        self
    }

    /// Add a query parameter; a repeated key replaces the earlier value.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Set the status codes treated as success. Empty accepts any status.
    #[must_use]
    pub fn with_accepted_status(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.accepted_status = codes.into_iter().collect();
        self
    }

    /// Set the operation name reported in errors.
    #[must_use]
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }

    /// Bound the whole call, retries and backoff included.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Path relative to the client host.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Content type, if set.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Body, if any.
    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// Query parameters, ordered by key.
    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// Accepted status codes; empty means any status is accepted.
    pub fn accepted_status(&self) -> &[u16] {
        &self.accepted_status
    }

    /// Check whether `status` counts as success for this request.
    pub fn accepts(&self, status: u16) -> bool {
        self.accepted_status.is_empty() || self.accepted_status.contains(&status)
    }

    /// Operation name reported in errors; defaults to `METHOD path`.
    pub fn function(&self) -> String {
        if self.function.is_empty() {
            format!("{} {}", self.method, self.path)
        } else {
            self.function.clone()
        }
    }

    /// Deadline for the whole call, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_with_json_sets_content_type() {
        let request = Request::post("/indexes").with_json(json!({"uid": "movies"}));
        assert_eq!(request.content_type(), Some(CONTENT_TYPE_JSON));
        assert!(matches!(request.body(), Some(RequestBody::Serialize(_))));
    }

    #[test]
    fn test_with_body_keeps_content_type_unset() {
        let request = Request::post("/indexes").with_body(json!({"uid": "movies"}));
        assert_eq!(request.content_type(), None);
    }

    #[test]
    fn test_query_keys_are_unique() {
        let request = Request::get("/tasks")
            .with_query("limit", "10")
            .with_query("limit", "20")
            .with_query("from", "3");
        assert_eq!(request.query().len(), 2);
        assert_eq!(request.query()["limit"], "20");
    }

    #[test]
    fn test_empty_accepted_status_accepts_all() {
        let request = Request::get("/health");
        assert!(request.accepts(500));
        let request = request.with_accepted_status([200, 204]);
        assert!(request.accepts(204));
        assert!(!request.accepts(500));
    }

    #[test]
    fn test_default_function_name() {
        assert_eq!(Request::get("/version").function(), "GET /version");
        assert_eq!(
            Request::get("/version").with_function("version").function(),
            "version"
        );
    }

    #[test]
    fn test_serialize_body_blanket_impl() {
        let mut out = Vec::new();
        json!({"a": 1}).serialize_body(&mut out).unwrap();
        assert_eq!(out, br#"{"a":1}"#);

        let mut out = Vec::new();
        let bad: HashMap<(u8, u8), u8> = [((1, 2), 3)].into_iter().collect();
        assert!(bad.serialize_body(&mut out).is_err());
    }
}
