//! Retry and backoff policy.
//!
//! This module encapsulates error classification (timeouts, throttling,
//! connection failures, permanent refusals) and exponential backoff decisions
//! so the transfer unit and the backends share one policy. The attempt loop is
//! an explicit state machine (`AttemptState`) driven by `RetryPolicy::step`.

mod classify;
mod policy;
mod run;

pub use classify::{classify, classify_ftp_reply, classify_http_status, classify_io_error, error_for};
pub use policy::{AttemptState, ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, RetryReport};
