//! Utility functions for the search HTTP client.
//!
//! This module provides helper functions for:
//! - Joining the client host with request paths and query parameters
//! - Media type extraction from `Content-Type` values
//! - Status code classification
//! - Retry backoff calculation

use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Join `host` with `path` and append `query` pairs.
///
/// The host may carry a path prefix (e.g. a reverse proxy mount such as
/// `http://example.com/search`); `path` is appended to it rather than
/// replacing it. Query pairs are form-encoded in key order.
///
/// # Examples
///
/// ```
/// use docsearch_http::client::build_url;
/// use std::collections::BTreeMap;
///
/// let mut query = BTreeMap::new();
/// query.insert("limit".to_string(), "20".to_string());
/// query.insert("q".to_string(), "star wars".to_string());
///
/// let url = build_url("http://localhost:7700", "/indexes/movies/documents", &query).unwrap();
/// assert_eq!(
///     url.as_str(),
///     "http://localhost:7700/indexes/movies/documents?limit=20&q=star+wars"
/// );
/// ```
pub fn build_url(
    host: &str,
    path: &str,
    query: &BTreeMap<String, String>,
) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(host)?;
    if !base.path().ends_with('/') {
        let prefixed = format!("{}/", base.path());
        base.set_path(&prefixed);
    }

    let mut url = base.join(path.trim_start_matches('/'))?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.iter());
    }
    Ok(url)
}

/// Extract the lowercase media type from a `Content-Type` value, dropping
/// parameters such as `charset`.
///
/// Returns `None` for an empty value.
pub fn media_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if essence.is_empty() {
        None
    } else {
        Some(essence.to_ascii_lowercase())
    }
}

/// Check if status code indicates a transient, retryable failure
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 502 | 503 | 504)
}

/// Exponential backoff delay calculation
///
/// Returns `base * 2^attempt`, with the exponent capped at 10 and the result
/// capped at `max`.
pub fn exponential_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2_u32.pow(attempt.min(10));
    base.saturating_mul(factor).min(max)
}
