//! Storage backend capability surface.
//!
//! The engine never speaks a protocol itself. Each backend adapts one driver
//! (FTP session, S3 client) to `StorageBackend`; the pool, transfer units and
//! listers only use the methods below.

pub mod ftp;
pub mod s3;

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::error::{ConnectionError, TransferError};
use crate::progress::{ProgressReader, ProgressSink};

pub use ftp::{FtpBackend, FtpSettings};
pub use s3::{S3Backend, S3Settings};

/// Result of a liveness probe. Only the session pool consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
}

/// One entry of a remote listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Full remote key/path (prefix included).
    pub key: String,
    pub size: u64,
    pub modified_at: Option<SystemTime>,
    /// Backend knows this entry is a directory (FTP `d` entries).
    pub is_dir: bool,
}

impl RemoteEntry {
    pub fn file(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            modified_at: None,
            is_dir: false,
        }
    }
}

/// One page of a listing. `next_token` is `None` on the last page.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    pub next_token: Option<String>,
}

/// Listing failure, split so "path not found" is not reported as an error.
#[derive(Debug)]
pub enum ListError {
    NotFound,
    Transfer(TransferError),
}

impl From<TransferError> for ListError {
    fn from(e: TransferError) -> Self {
        ListError::Transfer(e)
    }
}

/// How a large file is cut up for chunked/multipart upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunk_size: u64,
    /// Parts in flight at once for a single file.
    pub concurrency: usize,
}

impl Default for ChunkPlan {
    fn default() -> Self {
        Self {
            chunk_size: 8 * 1024 * 1024,
            concurrency: 10,
        }
    }
}

/// Most parts a single multipart upload may have (S3 part numbers are 1..=10000).
pub const MAX_PARTS: u64 = 10_000;

impl ChunkPlan {
    /// Chunk size actually used for a file of `len` bytes: the configured
    /// size, grown so the file never needs more than `MAX_PARTS` chunks.
    pub fn chunk_size_for(&self, len: u64) -> u64 {
        self.chunk_size.max(len.div_ceil(MAX_PARTS)).max(1)
    }

    /// Number of chunks for a file of `len` bytes (at least 1, at most `MAX_PARTS`).
    pub fn chunk_count(&self, len: u64) -> u64 {
        len.div_ceil(self.chunk_size_for(len)).max(1)
    }
}

/// Narrow capability interface the engine needs from a storage protocol.
///
/// Implementations must be shareable across worker threads; per-connection
/// state lives in `Session`, which is only ever used by one worker at a time.
pub trait StorageBackend: Send + Sync {
    type Session: Send;

    /// Human-readable endpoint for logs (`ftp://host:21/zone`).
    fn describe(&self) -> String;

    /// Open and authenticate a new session.
    fn connect(&self) -> Result<Self::Session, ConnectionError>;

    /// Cheap idempotent liveness check.
    fn probe(&self, session: &mut Self::Session) -> Liveness;

    /// Close a session. Errors are ignored.
    fn close(&self, session: Self::Session);

    /// Remote size, when the protocol supports asking for it.
    fn size(&self, session: &mut Self::Session, key: &str) -> Option<u64>;

    /// Stream the object at `key` into `writer`. Returns bytes written.
    fn read_stream(
        &self,
        session: &mut Self::Session,
        key: &str,
        writer: &mut dyn Write,
    ) -> Result<u64, TransferError>;

    /// Store `len` bytes from `reader` at `key`. Returns bytes sent.
    fn write_stream(
        &self,
        session: &mut Self::Session,
        key: &str,
        reader: &mut dyn Read,
        len: u64,
    ) -> Result<u64, TransferError>;

    /// Chunked strategy for large files. Backends without one stream the file.
    fn write_chunked(
        &self,
        session: &mut Self::Session,
        key: &str,
        source: &Path,
        plan: &ChunkPlan,
        progress: &ProgressSink,
    ) -> Result<u64, TransferError> {
        let _ = plan;
        let file = File::open(source)?;
        let len = file.metadata()?.len();
        let mut reader = ProgressReader::new(BufReader::new(file), progress.clone());
        self.write_stream(session, key, &mut reader, len)
    }

    /// Make sure `path` exists remotely. Tolerates "already exists".
    fn ensure_remote_dir(&self, session: &mut Self::Session, path: &str)
        -> Result<(), TransferError>;

    /// One page of entries under `prefix`, continuing from `token`.
    fn list(
        &self,
        session: &mut Self::Session,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, ListError>;
}

/// Parent "directory" of a remote key (`a/b/c.jpg` -> `a/b`), if any.
pub fn remote_parent(key: &str) -> Option<&str> {
    let trimmed = key.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&trimmed[..idx]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_count_rounds_up() {
        let plan = ChunkPlan {
            chunk_size: 8,
            concurrency: 2,
        };
        assert_eq!(plan.chunk_count(0), 1);
        assert_eq!(plan.chunk_count(8), 1);
        assert_eq!(plan.chunk_count(9), 2);
        assert_eq!(plan.chunk_count(64), 8);
    }

    #[test]
    fn huge_files_grow_the_chunk_to_stay_under_the_part_limit() {
        let plan = ChunkPlan::default();
        let gib = 1024 * 1024 * 1024u64;
        assert_eq!(plan.chunk_size_for(gib), plan.chunk_size);
        assert_eq!(plan.chunk_count(gib), 128);

        let len = 100 * gib;
        let size = plan.chunk_size_for(len);
        assert!(size > plan.chunk_size);
        assert_eq!(plan.chunk_count(len), MAX_PARTS);
        assert!(size * MAX_PARTS >= len);
    }

    #[test]
    fn remote_parent_of_nested_key() {
        assert_eq!(remote_parent("out/run_001/a.ply"), Some("out/run_001"));
        assert_eq!(remote_parent("a.ply"), None);
        assert_eq!(remote_parent("/a.ply"), None);
        assert_eq!(remote_parent("out/dir/"), Some("out"));
    }
}
