//! Retry policy for the request executor.
//!
//! The policy is configured once per client and shared read-only by every
//! call. Only responses whose status is in [`RetryPolicy::retry_on_status`]
//! are retried; local precondition failures, transport failures and timeouts
//! are returned to the caller immediately.

use super::utils::exponential_backoff;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// HTTP status codes that trigger a retry
    pub retry_on_status: Vec<u16>,
    /// Whether retries happen at all
    pub enabled: bool,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_on_status: vec![502, 503, 504],
            enabled: true,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Default policy, see [`RetryPolicy::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set the retry limit.
    #[must_use]
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Turn retries on or off.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the first delay.
    #[must_use]
    pub fn with_initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff = duration;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub fn with_max_backoff(mut self, duration: Duration) -> Self {
        self.max_backoff = duration;
        self
    }

    /// Add one status code to the retry set.
    #[must_use]
    pub fn with_retry_on_status(mut self, status: u16) -> Self {
        if !self.retry_on_status.contains(&status) {
            self.retry_on_status.push(status);
        }
        self
    }

    /// Replace the retry set.
    #[must_use]
    pub fn with_retry_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_on_status = statuses.into_iter().collect();
        self
    }

    /// Decide whether a response with `status` gets another attempt.
    ///
    /// `retries_done` counts the retries already performed, so the first
    /// failure is checked with `0`.
    pub fn should_retry(&self, status: u16, retries_done: u32) -> bool {
        self.enabled && retries_done < self.max_retries && self.retry_on_status.contains(&status)
    }

    /// Delay before retry number `retries_done + 1`.
    pub fn backoff(&self, retries_done: u32) -> Duration {
        exponential_backoff(retries_done, self.initial_backoff, self.max_backoff)
    }
}
