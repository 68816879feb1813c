//! Request executor.
//!
//! Provides [`SearchClient`], which turns a [`Request`] into one HTTP
//! exchange: URL and body preparation, content encoding, retries on
//! retryable statuses, status validation and response decoding.
//!
//! # Examples
//!
//! ## Decoding a JSON response
//!
//! ```no_run
//! use docsearch_http::{Request, SearchClient};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Version {
//!     #[serde(rename = "pkgVersion")]
//!     pkg_version: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SearchClient::with_api_key("http://localhost:7700", "masterKey");
//!     let version: Version = client
//!         .execute(Request::get("/version").with_accepted_status([200]).with_function("version"))
//!         .await?;
//!     println!("server {}", version.pkg_version);
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! ```ignore
//! let mut stream = client
//!     .stream::<Chunk>(Request::post("/chats/main/chat/completions").with_json(body))
//!     .await?;
//! while stream.next().await {
//!     print!("{}", stream.current().unwrap().text);
//! }
//! if let Some(err) = stream.err() {
//!     eprintln!("stream failed: {}", err);
//! }
//! ```

use crate::client::config::ClientConfig;
use crate::client::utils::build_url;
use crate::encoding::{BufferPool, ContentEncoder, Scheme};
use crate::error::{ApiError, BoxError, Error, ErrorKind, RequestError, Result};
use crate::stream::{ByteStream, DecoderRegistry, Stream};
use crate::types::{Request, RequestBody};
use bytes::Bytes;
use futures::StreamExt;
use http::header::{
    ACCEPT_ENCODING, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT,
};
use http::Method;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

/// Client for the document-search HTTP API.
///
/// Cheap to clone; clones share the connection pool, configuration,
/// encoder pools and decoder registry.
#[derive(Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
    encoder: Option<Arc<ContentEncoder>>,
    decoders: Arc<DecoderRegistry>,
    buffers: Arc<BufferPool>,
}

/// A request after URL building and body serialization.
struct Prepared {
    url: Url,
    body: Option<Bytes>,
    /// Plain request body for diagnostics
    body_text: String,
}

impl SearchClient {
    /// Create a client for `host` with default configuration
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_config(ClientConfig::new(host))
    }

    /// Create a client for `host` authenticated with `api_key`
    pub fn with_api_key(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_config(ClientConfig::new(host).with_api_key(api_key))
    }

    /// Create a client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connection_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.max_idle_connections);

        if config.proxy_url.is_empty() {
            builder = builder.no_proxy();
        } else {
            match reqwest::Proxy::all(&config.proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => {
                    if config.enable_logging {
                        tracing::warn!("Ignoring invalid proxy url {}: {}", config.proxy_url, e);
                    }
                }
            }
        }

        let client = builder.build().unwrap_or_default();
        let buffers = Arc::new(BufferPool::new());
        let encoder = ContentEncoder::new(&config.encoding, buffers.clone()).map(Arc::new);

        SearchClient {
            client,
            config: Arc::new(config),
            encoder,
            decoders: Arc::new(DecoderRegistry::new()),
            buffers,
        }
    }

    /// Replace the stream decoder registry.
    #[must_use]
    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = Arc::new(decoders);
        self
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Scheme applied to request bodies and advertised for responses.
    pub fn scheme(&self) -> Scheme {
        self.encoder
            .as_ref()
            .map(|encoder| encoder.scheme())
            .unwrap_or_default()
    }

    /// Execute `request` and decode the JSON response into `T`.
    ///
    /// An empty response body decodes as JSON `null`, so `()` and `Option<_>`
    /// destinations accept it.
    pub async fn execute<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        self.with_deadline(&request, async {
            let (prepared, response) = self.dispatch(&request, false).await?;
            self.decode(&request, &prepared, response).await
        })
        .await
    }

    /// Execute `request` and discard the response body.
    pub async fn execute_unit(&self, request: Request) -> Result<()> {
        self.with_deadline(&request, async {
            self.dispatch(&request, false).await?;
            Ok(())
        })
        .await
    }

    /// Execute `request` and decode the response body as a stream of `T`.
    ///
    /// Status validation and retries apply as for [`SearchClient::execute`].
    /// The decoder is chosen from the response `Content-Type` by the client's
    /// [`DecoderRegistry`]. A request timeout bounds only the wait for the
    /// response head; the body is read for as long as the server keeps it open.
    pub async fn stream<T: DeserializeOwned>(&self, request: Request) -> Result<Stream<T>> {
        let (_, response) = self
            .with_deadline(&request, self.dispatch(&request, true))
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(io::Error::other)),
        );
        let decoder = self.decoders.decoder_for(content_type.as_deref(), body);

        Ok(Stream::new(decoder).with_request(
            request.path(),
            request.method().as_str(),
            request.function(),
        ))
    }

    /// Bound `fut` by the request's deadline, if it has one.
    async fn with_deadline<F, R>(&self, request: &Request, fut: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        match request.timeout() {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|elapsed| self.error(request, ErrorKind::Timeout).with_source(elapsed))?,
            None => fut.await,
        }
    }

    /// Prepare, send with retries and validate the status.
    async fn dispatch(
        &self,
        request: &Request,
        streaming: bool,
    ) -> Result<(Prepared, reqwest::Response)> {
        let prepared = self.prepare(request)?;
        let response = self.send_with_retries(request, &prepared, streaming).await?;
        let response = self.check_status(request, &prepared, response).await?;
        Ok((prepared, response))
    }

    fn prepare(&self, request: &Request) -> Result<Prepared> {
        let url = build_url(&self.config.host, request.path(), request.query())
            .map_err(|e| self.error(request, ErrorKind::InvalidRequest).with_source(e))?;

        let Some(body) = request.body() else {
            return Ok(Prepared {
                url,
                body: None,
                body_text: String::new(),
            });
        };

        if matches!(*request.method(), Method::GET | Method::HEAD) {
            return Err(self
                .error(request, ErrorKind::InvalidRequest)
                .with_source(RequestError::BodyNotAllowed(request.method().to_string())));
        }
        if request.content_type().is_none() {
            return Err(self
                .error(request, ErrorKind::InvalidRequest)
                .with_source(RequestError::MissingContentType));
        }

        if let (RequestBody::Raw(raw), None) = (body, &self.encoder) {
            return Ok(Prepared {
                url,
                body: Some(raw.clone()),
                body_text: String::from_utf8_lossy(raw).into_owned(),
            });
        }

        let mut plain = self.buffers.get();
        match body {
            RequestBody::Raw(raw) => plain.extend_from_slice(raw),
            RequestBody::Serialize(value) => value
                .serialize_body(&mut plain)
                .map_err(|e| self.error(request, ErrorKind::MarshalFailure).with_source(e))?,
        }
        let body_text = String::from_utf8_lossy(&plain).into_owned();

        let payload = match &self.encoder {
            Some(encoder) => encoder.encode_bytes(&plain).map_err(|e| {
                self.error(request, ErrorKind::MarshalFailure)
                    .with_request_body(body_text.clone())
                    .with_source(e)
            })?,
            None => plain.to_vec(),
        };

        Ok(Prepared {
            url,
            body: Some(Bytes::from(payload)),
            body_text,
        })
    }

    fn build(
        &self,
        request: &Request,
        prepared: &Prepared,
        streaming: bool,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(request.method().clone(), prepared.url.clone())
            .header(USER_AGENT, &self.config.user_agent);

        if !streaming && self.config.request_timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(self.config.request_timeout_ms));
        }
        if let Some(key) = &self.config.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
        }
        if let Some(content_type) = request.content_type() {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(encoder) = &self.encoder {
            if !streaming {
                builder = builder.header(ACCEPT_ENCODING, encoder.scheme().as_str());
            }
            if prepared.body.is_some() {
                builder = builder.header(CONTENT_ENCODING, encoder.scheme().as_str());
            }
        }
        for (name, value) in &self.config.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &prepared.body {
            builder = builder.body(body.clone());
        }
        builder
    }

    /// Send until the status leaves the retry set or retries run out.
    async fn send_with_retries(
        &self,
        request: &Request,
        prepared: &Prepared,
        streaming: bool,
    ) -> Result<reqwest::Response> {
        let policy = &self.config.retry;
        let mut retries = 0;

        loop {
            if self.config.enable_logging {
                tracing::debug!(
                    method = %request.method(),
                    url = %prepared.url,
                    attempt = retries + 1,
                    "sending request"
                );
            }

            let response = self
                .build(request, prepared, streaming)
                .send()
                .await
                .map_err(|e| self.transport_error(request, prepared, e))?;

            let status = response.status().as_u16();
            let explicitly_accepted = request.accepted_status().contains(&status);
            if explicitly_accepted || !policy.should_retry(status, retries) {
                return Ok(response);
            }

            let delay = policy.backoff(retries);
            if self.config.enable_logging {
                tracing::warn!(
                    "Request {} {} failed with status {} (attempt {}), retrying after {:?}",
                    request.method(),
                    request.path(),
                    status,
                    retries + 1,
                    delay
                );
            }
            drop(response);
            sleep(delay).await;
            retries += 1;
        }
    }

    async fn check_status(
        &self,
        request: &Request,
        prepared: &Prepared,
        response: reqwest::Response,
    ) -> Result<reqwest::Response> {
        let status = response.status().as_u16();
        if request.accepts(status) {
            return Ok(response);
        }

        let encoder = self.response_encoder(&response);
        let (raw, read_error) = match response.bytes().await {
            Ok(raw) => (raw, None),
            Err(e) => (Bytes::new(), Some(e)),
        };
        let body = match &encoder {
            Some(encoder) => encoder
                .decompress(&raw)
                .map(Bytes::from)
                .unwrap_or_else(|_| raw.clone()),
            None => raw,
        };

        let mut err = self
            .error(request, ErrorKind::UnexpectedStatus)
            .with_status(status)
            .with_accepted_status(request.accepted_status().to_vec())
            .with_request_body(prepared.body_text.clone())
            .with_response_body(String::from_utf8_lossy(&body).into_owned());

        if let Ok(api_error) = serde_json::from_slice::<ApiError>(&body) {
            if !api_error.message.is_empty() || !api_error.code.is_empty() {
                err = err.with_api_error(api_error);
            }
        }
        if let Some(e) = read_error {
            err = err.with_source(e);
        }
        Err(err)
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        request: &Request,
        prepared: &Prepared,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status().as_u16();
        let encoder = self.response_encoder(&response);
        let raw = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(request, prepared, e))?;

        let decoded: std::result::Result<T, BoxError> = match &encoder {
            _ if raw.is_empty() => serde_json::from_slice(b"null").map_err(Into::into),
            Some(encoder) => encoder.decode(&raw).map_err(Into::into),
            None => serde_json::from_slice(&raw).map_err(Into::into),
        };

        decoded.map_err(|source| {
            let text = match &encoder {
                Some(encoder) => match encoder.decompress(&raw) {
                    Ok(plain) => String::from_utf8_lossy(&plain).into_owned(),
                    Err(_) => String::from_utf8_lossy(&raw).into_owned(),
                },
                None => String::from_utf8_lossy(&raw).into_owned(),
            };
            self.error(request, ErrorKind::UnmarshalFailure)
                .with_status(status)
                .with_accepted_status(request.accepted_status().to_vec())
                .with_request_body(prepared.body_text.clone())
                .with_response_body(text)
                .with_source(source)
        })
    }

    /// Decoder for the response's `Content-Encoding`, if it names a known scheme.
    fn response_encoder(&self, response: &reqwest::Response) -> Option<Arc<ContentEncoder>> {
        let name = response.headers().get(CONTENT_ENCODING)?.to_str().ok()?;
        let scheme = Scheme::from_name(name)?;
        match &self.encoder {
            Some(encoder) if encoder.scheme() == scheme => Some(encoder.clone()),
            _ => ContentEncoder::from_name(
                name,
                self.config.encoding.level,
                self.buffers.clone(),
            )
            .map(Arc::new),
        }
    }

    fn transport_error(&self, request: &Request, prepared: &Prepared, e: reqwest::Error) -> Error {
        let kind = if e.is_timeout() {
            ErrorKind::Timeout
        } else if e.is_builder() {
            ErrorKind::InvalidRequest
        } else {
            ErrorKind::TransportFailure
        };
        self.error(request, kind)
            .with_request_body(prepared.body_text.clone())
            .with_source(e)
    }

    fn error(&self, request: &Request, kind: ErrorKind) -> Error {
        Error::new(
            kind,
            request.path(),
            request.method().as_str(),
            request.function(),
        )
    }
}

impl Default for SearchClient {
    fn default() -> Self {
        Self::with_config(ClientConfig::default())
    }
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("host", &self.config.host)
            .field("scheme", &self.scheme())
            .field("retry", &self.config.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::EncodingConfig;
    use serde_json::json;

    /// Nothing listens here; tests using it must fail before sending.
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    #[test]
    fn test_client_creation() {
        let client = SearchClient::new(UNREACHABLE);
        assert_eq!(client.config().retry.max_retries, 3);
        assert_eq!(client.scheme(), Scheme::None);

        let config = ClientConfig {
            encoding: EncodingConfig::new(Scheme::Brotli),
            ..ClientConfig::new(UNREACHABLE)
        };
        assert_eq!(SearchClient::with_config(config).scheme(), Scheme::Brotli);
    }

    #[tokio::test]
    async fn test_body_on_get_is_rejected_locally() {
        let client = SearchClient::new(UNREACHABLE);
        let err = client
            .execute::<serde_json::Value>(
                Request::get("/indexes").with_json(json!({"limit": 1})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("GET"));
    }

    #[tokio::test]
    async fn test_missing_content_type_is_rejected_locally() {
        let client = SearchClient::new(UNREACHABLE);
        let err = client
            .execute_unit(Request::post("/indexes").with_body(json!({"uid": "movies"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("Content-Type"));
    }

    #[tokio::test]
    async fn test_marshal_failure() {
        use std::collections::HashMap;
        let client = SearchClient::new(UNREACHABLE);
        let bad: HashMap<(u8, u8), u8> = [((1, 2), 3)].into_iter().collect();
        let err = client
            .execute_unit(Request::post("/indexes").with_json(bad))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MarshalFailure);
    }

    #[tokio::test]
    async fn test_invalid_host() {
        let client = SearchClient::new("not a url");
        let err = client.execute_unit(Request::get("/health")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_prepare_encodes_body() {
        let config = ClientConfig {
            encoding: EncodingConfig::new(Scheme::Gzip),
            ..ClientConfig::new(UNREACHABLE)
        };
        let client = SearchClient::with_config(config);
        let request = Request::post("/indexes/movies/documents")
            .with_query("primaryKey", "id")
            .with_json(json!([{"id": 1}]));

        let prepared = client.prepare(&request).unwrap();
        assert_eq!(prepared.body_text, r#"[{"id":1}]"#);
        let body = prepared.body.unwrap();
        assert_eq!(&body[..2], &[0x1f, 0x8b]);
        assert_eq!(prepared.url.query(), Some("primaryKey=id"));
        assert_eq!(client.buffers.idle(), 1);
    }

    #[test]
    fn test_prepare_raw_body_without_encoder_is_not_copied() {
        let client = SearchClient::new(UNREACHABLE);
        let raw = Bytes::from_static(b"id,title\n1,Dune\n");
        let request = Request::post("/indexes/movies/documents")
            .with_content_type("text/csv")
            .with_raw_body(raw.clone());
        let prepared = client.prepare(&request).unwrap();
        assert_eq!(prepared.body, Some(raw));
        assert_eq!(client.buffers.idle(), 0);
    }
}
