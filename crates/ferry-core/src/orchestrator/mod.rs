//! Bulk transfer orchestrator: bounded OS-thread workers over a shared queue.
//!
//! Workers pop items from one queue, run a transfer unit inside
//! `catch_unwind` and send the outcome back over a channel. The calling thread
//! is the only writer of `RunResult` and folds outcomes in completion order.

mod result;

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::backend::StorageBackend;
use crate::control::CancelToken;
use crate::pool::SessionPool;
use crate::progress::ProgressEvent;
use crate::retry::RetryPolicy;
use crate::transfer::{transfer_one, Direction, MultipartPolicy, Outcome, TransferContext, WorkItem};

pub use result::{Preview, RunResult, PREVIEW_LIMIT};

pub const DEFAULT_DOWNLOAD_WORKERS: usize = 4;
pub const DEFAULT_UPLOAD_WORKERS: usize = 2;

/// Runs work items against one session pool.
pub struct Orchestrator<'a, B: StorageBackend> {
    pool: &'a SessionPool<B>,
    retry: RetryPolicy,
    multipart: MultipartPolicy,
    cancel: CancelToken,
    progress: Option<Sender<ProgressEvent>>,
}

impl<'a, B: StorageBackend> Orchestrator<'a, B> {
    pub fn new(pool: &'a SessionPool<B>) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
            multipart: MultipartPolicy::default(),
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_multipart(mut self, multipart: MultipartPolicy) -> Self {
        self.multipart = multipart;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Option<Sender<ProgressEvent>>) -> Self {
        self.progress = progress;
        self
    }

    /// Run every item to a terminal outcome (or until cancelled).
    pub fn run(&self, items: Vec<WorkItem>, direction: Direction, max_workers: usize) -> RunResult {
        let started = Instant::now();
        let mut result = RunResult::new(direction, items.len());
        if items.is_empty() {
            tracing::info!(%direction, "nothing to transfer");
            return result;
        }

        let workers = max_workers.min(items.len()).max(1);
        let queue: Mutex<VecDeque<WorkItem>> = Mutex::new(items.into_iter().collect());
        let ctx = TransferContext {
            pool: self.pool,
            retry: self.retry,
            multipart: self.multipart,
            cancel: &self.cancel,
            progress: self.progress.clone(),
        };
        tracing::info!(%direction, items = result.total, workers, endpoint = %self.pool.backend().describe(), "starting run");

        std::thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<(String, Outcome)>();
            for worker in 0..workers {
                let tx = tx.clone();
                let ctx = ctx.clone();
                let queue = &queue;
                let cancel = &self.cancel;
                scope.spawn(move || worker_loop(worker, queue, cancel, &ctx, &tx));
            }
            drop(tx);

            for (id, outcome) in rx {
                result.record(&id, &outcome);
                self.publish(ProgressEvent::Finished {
                    item: id.into(),
                    outcome,
                });
                self.publish(ProgressEvent::Tally(result.progress()));
            }
        });

        result.not_started = lock_queue(&queue).len();
        result.cancelled = self.cancel.is_cancelled();
        result.elapsed = started.elapsed();
        log_summary(&result);
        result
    }

    fn publish(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }
}

fn worker_loop<B: StorageBackend>(
    worker: usize,
    queue: &Mutex<VecDeque<WorkItem>>,
    cancel: &CancelToken,
    ctx: &TransferContext<'_, B>,
    tx: &Sender<(String, Outcome)>,
) {
    loop {
        if cancel.is_cancelled() {
            tracing::debug!(worker, "cancelled, not taking new items");
            break;
        }
        let Some(item) = lock_queue(queue).pop_front() else {
            break;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| transfer_one(ctx, &item)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(worker, item = item.label(), panic = %message, "transfer panicked");
                Outcome::failed(format!("internal error: {message}"))
            });
        if tx.send((item.label().to_string(), outcome)).is_err() {
            break;
        }
    }
}

fn lock_queue(queue: &Mutex<VecDeque<WorkItem>>) -> MutexGuard<'_, VecDeque<WorkItem>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn log_summary(result: &RunResult) {
    tracing::info!(
        direction = %result.direction,
        successful = result.successful,
        failed = result.failed,
        corrupted = result.corrupted,
        not_started = result.not_started,
        bytes = result.bytes_transferred,
        elapsed_ms = result.elapsed.as_millis() as u64,
        success_pct = result.success_rate(),
        "run finished"
    );
    if !result.failed_items.is_empty() {
        tracing::warn!(count = result.failed, items = %result.failed_items, "failed items");
    }
    if !result.corrupted_items.is_empty() {
        tracing::warn!(count = result.corrupted, items = %result.corrupted_items, "corrupted items");
    }
    if result.cancelled {
        tracing::warn!(not_started = result.not_started, "run cancelled");
    }
}

#[cfg(test)]
mod tests;
