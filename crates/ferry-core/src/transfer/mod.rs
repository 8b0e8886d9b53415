//! Transfer units: download-one and upload-one with retry and progress.
//!
//! Every attempt checks a session out of the pool and returns it through the
//! guard on every exit path. Sessions that failed at the connection level are
//! discarded instead of re-pooled.

mod download;
mod upload;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::backend::{ChunkPlan, StorageBackend};
use crate::control::CancelToken;
use crate::pool::SessionPool;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::retry::RetryPolicy;

/// Files strictly larger than this use the chunked upload strategy.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Which way bytes flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => write!(f, "download"),
            Direction::Upload => write!(f, "upload"),
        }
    }
}

/// One file/object scheduled for transfer. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    direction: Direction,
    local: PathBuf,
    remote: String,
    expected_size: Option<u64>,
}

impl WorkItem {
    pub fn download(remote: impl Into<String>, local: impl Into<PathBuf>, expected_size: Option<u64>) -> Self {
        Self {
            direction: Direction::Download,
            local: local.into(),
            remote: remote.into(),
            expected_size,
        }
    }

    pub fn upload(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            direction: Direction::Upload,
            local: local.into(),
            remote: remote.into(),
            expected_size: None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn local(&self) -> &Path {
        &self.local
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn expected_size(&self) -> Option<u64> {
        self.expected_size
    }

    /// Identifier used in reports: the remote key.
    pub fn label(&self) -> &str {
        &self.remote
    }
}

/// Why a download that "succeeded" is not usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionReason {
    /// Destination file does not exist after the transfer.
    Missing,
    /// Destination file has zero length.
    Empty,
}

impl fmt::Display for CorruptionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptionReason::Missing => write!(f, "destination file missing after transfer"),
            CorruptionReason::Empty => write!(f, "destination file is empty"),
        }
    }
}

/// Terminal result of one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { bytes: u64 },
    Failed { cause: String },
    Corrupted { reason: CorruptionReason },
}

impl Outcome {
    pub fn failed(cause: impl fmt::Display) -> Self {
        Outcome::Failed {
            cause: cause.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Upload strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultipartPolicy {
    pub threshold: u64,
    pub plan: ChunkPlan,
}

impl Default for MultipartPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MULTIPART_THRESHOLD,
            plan: ChunkPlan::default(),
        }
    }
}

/// Everything a transfer unit needs besides the item itself.
pub struct TransferContext<'a, B: StorageBackend> {
    pub pool: &'a SessionPool<B>,
    pub retry: RetryPolicy,
    pub multipart: MultipartPolicy,
    pub cancel: &'a CancelToken,
    pub progress: Option<Sender<ProgressEvent>>,
}

impl<B: StorageBackend> Clone for TransferContext<'_, B> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool,
            retry: self.retry,
            multipart: self.multipart,
            cancel: self.cancel,
            progress: self.progress.clone(),
        }
    }
}

/// Run one work item to a terminal outcome.
pub fn transfer_one<B: StorageBackend>(ctx: &TransferContext<'_, B>, item: &WorkItem) -> Outcome {
    let sink = ProgressSink::new(Arc::from(item.label()), ctx.progress.clone());
    match item.direction() {
        Direction::Download => download::run(ctx, item, &sink),
        Direction::Upload => upload::run(ctx, item, &sink),
    }
}
