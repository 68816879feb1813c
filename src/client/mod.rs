//! Search HTTP client implementation.
//!
//! This module provides the request executor used by every resource wrapper
//! of the SDK, enabling callers to:
//!
//! - **Execute requests** described by a [`Request`](crate::Request) and decode JSON results
//! - **Compress bodies** under a negotiated content encoding
//! - **Automatically retry** retryable statuses with exponential backoff
//! - **Stream responses** as typed values decoded from Server-Sent Events
//! - **Wait for tasks** with cancellation or a deadline
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── fetch  - SearchClient and the request executor
//! ├── task   - get_task and the task poller
//! ├── retry  - RetryPolicy and backoff
//! ├── config - Client configuration
//! └── utils  - Utility functions
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SearchClient`] | Request executor, streaming and task polling |
//! | [`ClientConfig`] | Client configuration options |
//! | [`RetryPolicy`] | Which statuses are retried, how often and how long to wait |
//!
//! # Examples
//!
//! ## Creating a Client
//!
//! ```
//! use docsearch_http::client::{ClientConfig, RetryPolicy, SearchClient};
//! use std::time::Duration;
//!
//! // Default configuration
//! let client = SearchClient::new("http://localhost:7700");
//!
//! // Custom configuration
//! let config = ClientConfig {
//!     retry: RetryPolicy::default()
//!         .with_max_retries(5)
//!         .with_initial_backoff(Duration::from_millis(250)),
//!     enable_logging: true,
//!     ..ClientConfig::new("http://localhost:7700")
//! };
//! let client = SearchClient::with_config(config);
//! assert_eq!(client.config().retry.max_retries, 5);
//! ```
//!
//! ## Utility Functions
//!
//! ```
//! use docsearch_http::client::{exponential_backoff, is_retryable_status};
//! use std::time::Duration;
//!
//! // Check if status is retryable
//! assert!(is_retryable_status(503));
//! assert!(!is_retryable_status(404));
//!
//! // Calculate backoff delay
//! let delay = exponential_backoff(2, Duration::from_millis(100), Duration::from_secs(2));
//! assert_eq!(delay, Duration::from_millis(400));
//! ```

mod config;
mod fetch;
mod retry;
mod task;
mod utils;

pub use config::{ClientConfig, DEFAULT_HOST};
pub use fetch::SearchClient;
pub use retry::RetryPolicy;
pub use task::DEFAULT_POLL_INTERVAL;
pub use utils::*;
