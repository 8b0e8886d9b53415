use std::time::Duration;

use crate::config::RetryConfig;

/// High-level classification of an error for retry purposes.
///
/// Backends map protocol replies (FTP reply codes, HTTP statuses, SDK
/// failures) and socket errors into these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read/write).
    Timeout,
    /// Remote asked us to slow down (e.g. 429, 503, FTP 421).
    Throttled,
    /// Network-level failure (reset, refused, broken pipe, DNS).
    Connection,
    /// Remote-side failure that is worth retrying (5xx, FTP 45x).
    Server(u16),
    /// Explicit refusal from the remote. Never retried.
    PermissionDenied,
    /// Object or path does not exist. Never retried.
    NotFound,
    /// Local filesystem failure. Never retried.
    LocalIo,
    /// Anything else (typically not retried).
    Other,
}

impl ErrorKind {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Throttled | ErrorKind::Connection | ErrorKind::Server(_)
        )
    }

    /// Whether the session that produced this error should be thrown away
    /// instead of being offered back to the pool.
    pub fn poisons_session(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::Connection)
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// State of one work item's attempt loop.
///
/// `Attempting(n) -> { Succeeded, Retrying { next: n + 1, .. }, Exhausted, Fatal }`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Attempt `n` (1-based) is about to run.
    Attempting(u32),
    /// Attempt failed transiently; wait `after`, then run attempt `next`.
    Retrying { next: u32, after: Duration },
    /// Last attempt succeeded.
    Succeeded,
    /// Transient failure on the final allowed attempt.
    Exhausted,
    /// Non-transient failure; no further attempts.
    Fatal,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptState::Succeeded | AttemptState::Exhausted | AttemptState::Fatal
        )
    }
}

/// Exponential backoff policy with caps.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each following one.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(cfg.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
        }
    }

    /// Backoff to wait after failed attempt `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }

    /// Compute the next backoff delay for a given attempt and error kind.
    ///
    /// `attempt` is 1-based (1 = first attempt). Returns `RetryDecision::NoRetry`
    /// when we should stop retrying.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if !kind.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff_delay(attempt))
    }

    /// Advance the attempt state machine after attempt `attempt` finished.
    /// `failure` is `None` on success.
    pub fn step(&self, attempt: u32, failure: Option<ErrorKind>) -> AttemptState {
        let Some(kind) = failure else {
            return AttemptState::Succeeded;
        };
        if !kind.is_transient() {
            return AttemptState::Fatal;
        }
        match self.decide(attempt, kind) {
            RetryDecision::NoRetry => AttemptState::Exhausted,
            RetryDecision::RetryAfter(after) => AttemptState::Retrying {
                next: attempt + 1,
                after,
            },
        }
    }
}
