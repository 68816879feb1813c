//! Client configuration.

use super::retry::RetryPolicy;
use crate::encoding::EncodingConfig;
use std::collections::BTreeMap;

/// Default host of a locally running search service.
pub const DEFAULT_HOST: &str = "http://localhost:7700";

/// Configuration for a [`SearchClient`](crate::SearchClient).
///
/// Read once at construction; the built client never mutates it.
///
/// # Examples
///
/// ```
/// use docsearch_http::client::{ClientConfig, RetryPolicy};
/// use docsearch_http::encoding::{EncodingConfig, Scheme};
///
/// let config = ClientConfig {
///     host: "http://search.internal:7700".into(),
///     api_key: Some("masterKey".into()),
///     retry: RetryPolicy::default().with_max_retries(5),
///     encoding: EncodingConfig::new(Scheme::Gzip),
///     ..Default::default()
/// };
/// assert_eq!(config.request_timeout_ms, 30_000);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the service, optionally with a path prefix
    pub host: String,
    /// Sent as `Authorization: Bearer <key>` when set
    pub api_key: Option<String>,
    /// Per-attempt request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Connect timeout in seconds
    pub connection_timeout_secs: u64,
    /// Idle connections kept per host
    pub max_idle_connections: usize,
    /// Proxy URL; empty means no proxy
    pub proxy_url: String,
    /// Emit `tracing` events for attempts and retries
    pub enable_logging: bool,
    /// `User-Agent` header value
    pub user_agent: String,
    /// Headers added to every request
    pub extra_headers: BTreeMap<String, String>,
    /// Retry policy for retryable statuses
    pub retry: RetryPolicy,
    /// Body compression scheme and level
    pub encoding: EncodingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            api_key: None,
            request_timeout_ms: 30_000,
            connection_timeout_secs: 10,
            max_idle_connections: 32,
            proxy_url: String::new(),
            enable_logging: false,
            user_agent: format!("docsearch-http/{}", env!("CARGO_PKG_VERSION")),
            extra_headers: BTreeMap::new(),
            retry: RetryPolicy::default(),
            encoding: EncodingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Add a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Scheme;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.encoding.scheme, Scheme::None);
        assert!(config.user_agent.starts_with("docsearch-http/"));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_builders() {
        let config = ClientConfig::new("http://127.0.0.1:1")
            .with_api_key("key")
            .with_header("X-Trace", "1");
        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert_eq!(config.extra_headers["X-Trace"], "1");
    }
}
