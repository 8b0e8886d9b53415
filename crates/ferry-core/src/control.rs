//! Run control: a shared cancel token checked by workers and backoff sleeps.
//!
//! Cancellation is cooperative. Setting the token stops the orchestrator from
//! handing out new work items and cuts retry backoff short; transfers already
//! streaming are left to finish or fail on their own so partial writes are
//! never torn mid-protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Error returned when a run stops because cancellation was requested.
#[derive(Debug)]
pub struct RunCancelled;

impl std::fmt::Display for RunCancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run cancelled by user")
    }
}

impl std::error::Error for RunCancelled {}

/// Cheaply clonable cancellation flag shared between the caller (e.g. a
/// Ctrl-C handler) and every worker of a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Sleep for `duration` in short slices. Returns `false` as soon as
    /// cancellation is observed, `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
