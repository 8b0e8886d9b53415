//! Progress reporting for bulk runs (per-item bytes and run tallies).
//!
//! Workers and transfer units publish `ProgressEvent`s on one channel; the
//! presentation layer subscribes to the receiving end. This is an observation
//! channel only: a dropped receiver never affects the run.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::transfer::Outcome;

/// Minimum byte delta between two `Bytes` events for the same item.
const PROGRESS_STEP: u64 = 256 * 1024;

/// Event published while a run is in flight.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A worker picked up an item. `total` is 0 when the size is unknown.
    Started { item: Arc<str>, total: u64 },
    /// Bytes moved so far for one item.
    Bytes { item: Arc<str>, done: u64, total: u64 },
    /// Terminal outcome of one item.
    Finished { item: Arc<str>, outcome: Outcome },
    /// Run-level counters after each completion.
    Tally(RunProgress),
}

/// Snapshot of run-level counters (CLI-friendly).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunProgress {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub corrupted: usize,
    pub bytes: u64,
}

impl RunProgress {
    /// Fraction of items completed in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.completed as f64 / self.total as f64).min(1.0)
    }
}

/// Per-item handle used by transfer units and backends to report bytes.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    item: Arc<str>,
    total: Arc<AtomicU64>,
    done: Arc<AtomicU64>,
    last_sent: Arc<AtomicU64>,
    tx: Option<Sender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(item: Arc<str>, tx: Option<Sender<ProgressEvent>>) -> Self {
        Self {
            item,
            total: Arc::new(AtomicU64::new(0)),
            done: Arc::new(AtomicU64::new(0)),
            last_sent: Arc::new(AtomicU64::new(0)),
            tx,
        }
    }

    /// A sink that reports nowhere.
    pub fn disabled(item: &str) -> Self {
        Self::new(Arc::from(item), None)
    }

    pub fn item(&self) -> &Arc<str> {
        &self.item
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// Forget bytes counted by a failed attempt.
    pub fn reset(&self) {
        self.done.store(0, Ordering::Relaxed);
        self.last_sent.store(0, Ordering::Relaxed);
    }

    /// Emit a `Started` event with the current total.
    pub fn started(&self) {
        self.send(ProgressEvent::Started {
            item: Arc::clone(&self.item),
            total: self.total.load(Ordering::Relaxed),
        });
    }

    /// Count `n` more bytes; publishes at most one event per `PROGRESS_STEP`.
    pub fn add(&self, n: u64) {
        let done = self.done.fetch_add(n, Ordering::Relaxed) + n;
        let total = self.total.load(Ordering::Relaxed);
        let last = self.last_sent.load(Ordering::Relaxed);
        let finished = total > 0 && done >= total;
        if done.saturating_sub(last) >= PROGRESS_STEP || finished {
            self.last_sent.store(done, Ordering::Relaxed);
            self.send(ProgressEvent::Bytes {
                item: Arc::clone(&self.item),
                done,
                total,
            });
        }
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// `Write` adapter that counts bytes into a `ProgressSink`.
pub struct ProgressWriter<W> {
    inner: W,
    sink: ProgressSink,
}

impl<W: Write> ProgressWriter<W> {
    pub fn new(inner: W, sink: ProgressSink) -> Self {
        Self { inner, sink }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.sink.add(n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// `Read` adapter that counts bytes into a `ProgressSink`.
pub struct ProgressReader<R> {
    inner: R,
    sink: ProgressSink,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, sink: ProgressSink) -> Self {
        Self { inner, sink }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.sink.add(n as u64);
        Ok(n)
    }
}
