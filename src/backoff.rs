//! Retry decisions for classified fetch failures
//!
//! [`BackoffPolicy::decide`] is a pure decision function: given the class of a
//! failure and how many times the current page has already failed, it answers
//! whether to wait and retry, rotate to another credential, or give up.
//!
//! Delays double from a base value and are capped:
//! with base 2s and cap 30s the schedule is 2s, 4s, 8s, 16s, 30s, 30s, ...
//! A random jitter is added on top of the capped delay so that many chunks
//! failing at the same moment do not retry in lockstep.

use rand::Rng;
use std::time::Duration;

use crate::harvester::config::{
    DEFAULT_BASE_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_JITTER, DEFAULT_MAX_RETRIES,
};

/// Classification of a failed (or suspicious) page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// HTTP 429 or an explicit quota-exhausted signal
    RateLimited,
    /// Timeout, connection reset, 5xx
    Transient,
    /// 4xx other than 429: malformed request, not found, auth failure
    ClientError,
    /// Remaining quota below the safety threshold on an otherwise successful response
    QuotaCriticallyLow,
}

impl ErrorClass {
    /// Short label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::Transient => "transient",
            ErrorClass::ClientError => "client_error",
            ErrorClass::QuotaCriticallyLow => "quota_critically_low",
        }
    }

    /// Whether waiting and repeating the same request can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorClass::ClientError)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `after`, then repeat the same page
    Retry {
        /// Delay before the next attempt (jitter included)
        after: Duration,
    },
    /// Stop; the fetch fails with the classified error
    Abort,
    /// Rotate to another pool member before continuing (not a failed attempt)
    SwitchCredential,
}

/// Capped exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max_backoff: Duration,
    max_retries: u32,
    max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RETRIES)
    }
}

impl BackoffPolicy {
    /// Create a policy with the default jitter
    ///
    /// # Arguments
    /// * `base` - Delay before the first retry
    /// * `max_backoff` - Upper bound for any single computed delay
    /// * `max_retries` - Retries allowed per page for retryable classes
    pub fn new(base: Duration, max_backoff: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max_backoff,
            max_retries,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// Override the maximum random jitter added to each delay
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Disable jitter (deterministic delays)
    pub fn without_jitter(self) -> Self {
        self.with_max_jitter(Duration::ZERO)
    }

    /// Override the retry limit
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Retries allowed per page
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Upper bound for a single computed delay (before jitter)
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Capped delay for the given 1-based retry attempt, without jitter
    ///
    /// Attempt `0` is treated like attempt `1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base.checked_mul(factor))
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Decide what to do after a classified failure
    ///
    /// # Arguments
    /// * `class` - Classification of the failure
    /// * `attempt` - 1-based count of consecutive failures for the current page
    pub fn decide(&self, class: ErrorClass, attempt: u32) -> RetryDecision {
        match class {
            ErrorClass::ClientError => RetryDecision::Abort,
            ErrorClass::QuotaCriticallyLow => RetryDecision::SwitchCredential,
            ErrorClass::RateLimited | ErrorClass::Transient => {
                if attempt > self.max_retries {
                    RetryDecision::Abort
                } else {
                    RetryDecision::Retry {
                        after: self.delay_for(attempt) + self.jitter(),
                    }
                }
            }
        }
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
