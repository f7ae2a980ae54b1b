//! Retry-once policy for REST calls.

use std::collections::HashSet;

use super::ApiResponse;

/// When a failed call is re-issued, and when failures are logged.
///
/// A call is retried at most once, and only when the failure body is JSON
/// with an integer `code` in [`retry_codes`](Self::retry_codes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Whether retryable failures are re-issued.
    pub enabled: bool,
    /// Whether failed calls are logged at `warn`.
    ///
    /// This gates every failure log, so `false` also silences a first
    /// attempt that failed with a code outside [`retry_codes`](Self::retry_codes).
    pub log_errors: bool,
    /// Error codes that trigger a retry.
    pub retry_codes: HashSet<i64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            log_errors: true,
            retry_codes: HashSet::new(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the retryable codes.
    pub fn with_codes(mut self, codes: impl IntoIterator<Item = i64>) -> Self {
        self.retry_codes = codes.into_iter().collect();
        self
    }

    /// Whether a failed first attempt should be re-issued.
    pub fn should_retry(&self, response: &ApiResponse) -> bool {
        self.enabled
            && !response.is_success()
            && response
                .error_code()
                .is_some_and(|code| self.retry_codes.contains(&code))
    }
}
