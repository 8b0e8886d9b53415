//! Retry loop: run an attempt closure until success or the policy says stop.

use super::classify::classify;
use super::policy::{AttemptState, RetryPolicy};
use crate::control::CancelToken;
use crate::error::TransferError;

/// Final result of an attempt loop plus how many attempts were made.
#[derive(Debug)]
pub struct RetryReport<T> {
    pub result: Result<T, TransferError>,
    pub attempts: u32,
}

/// Runs `f(attempt)` until it succeeds or the retry policy says to stop.
/// On transient failure, sleeps for the backoff duration then tries again.
/// A cancelled run stops backing off and reports the last error.
pub fn run_with_retry<T, F>(policy: &RetryPolicy, cancel: &CancelToken, mut f: F) -> RetryReport<T>
where
    F: FnMut(u32) -> Result<T, TransferError>,
{
    let mut attempt = 1u32;
    loop {
        let err = match f(attempt) {
            Ok(value) => {
                return RetryReport {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) => e,
        };
        match policy.step(attempt, Some(classify(&err))) {
            AttemptState::Retrying { next, after } => {
                tracing::debug!(
                    attempt,
                    delay_ms = after.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                if !cancel.sleep(after) {
                    return RetryReport {
                        result: Err(err),
                        attempts: attempt,
                    };
                }
                attempt = next;
            }
            _ => {
                return RetryReport {
                    result: Err(err),
                    attempts: attempt,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn two_transient_failures_then_success() {
        let mut calls = 0;
        let report = run_with_retry(&fast_policy(), &CancelToken::new(), |_| {
            calls += 1;
            if calls < 3 {
                Err(TransferError::Timeout("slow".into()))
            } else {
                Ok(42u64)
            }
        });
        assert_eq!(report.result.unwrap(), 42);
        assert_eq!(report.attempts, 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let report: RetryReport<()> = run_with_retry(&fast_policy(), &CancelToken::new(), |n| {
            Err(TransferError::Connection(format!("reset #{n}")))
        });
        assert_eq!(report.attempts, 3);
        assert_eq!(
            report.result.unwrap_err().to_string(),
            "connection failure: reset #3"
        );
    }

    #[test]
    fn permanent_failure_stops_on_first_attempt() {
        let mut calls = 0;
        let report: RetryReport<()> = run_with_retry(&fast_policy(), &CancelToken::new(), |_| {
            calls += 1;
            Err(TransferError::PermissionDenied("550 denied".into()))
        });
        assert_eq!(calls, 1);
        assert_eq!(report.attempts, 1);
        assert!(report.result.is_err());
    }

    #[test]
    fn cancelled_run_does_not_back_off() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut calls = 0;
        let report: RetryReport<()> = run_with_retry(&fast_policy(), &cancel, |_| {
            calls += 1;
            Err(TransferError::Throttled("slow down".into()))
        });
        assert_eq!(calls, 1);
        assert!(report.result.is_err());
    }
}
