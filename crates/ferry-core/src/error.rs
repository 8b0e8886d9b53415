//! Error taxonomy shared by the pool, transfer units and backends.

use std::io;
use thiserror::Error;

/// Failure to establish (or re-establish) an authenticated session.
///
/// Raised by the up-front connection test this is fatal to the whole run;
/// raised by `SessionPool::acquire` mid-run it only fails the current item.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Credentials were rejected by the endpoint.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Endpoint could not be reached (DNS, refused, TLS, ...).
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    /// Connect or handshake exceeded the configured timeout.
    #[error("connection timed out: {0}")]
    Timeout(String),
    /// Endpoint answered but refused the session (missing bucket, zone, ...).
    #[error("session rejected: {0}")]
    Rejected(String),
    /// Backend settings are incomplete or invalid.
    #[error("invalid backend configuration: {0}")]
    Config(String),
}

/// Per-item transfer failure. The variant decides whether the item is retried.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("connection failure: {0}")]
    Connection(String),
    /// Remote asked us to slow down (429, 503, SlowDown, FTP 421).
    #[error("throttled by remote: {0}")]
    Throttled(String),
    /// Remote-side 5xx-class failure; `status` is the protocol status code.
    #[error("remote server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Local filesystem read/write failed (disk full, permissions). Not retried.
    #[error("local i/o: {0}")]
    LocalIo(#[from] io::Error),
    #[error("{0}")]
    Other(String),
}

impl TransferError {
    /// Map an I/O error raised while talking to the remote (socket level).
    pub fn from_remote_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                TransferError::Timeout(err.to_string())
            }
            io::ErrorKind::PermissionDenied => TransferError::PermissionDenied(err.to_string()),
            io::ErrorKind::NotFound => TransferError::NotFound(err.to_string()),
            _ => TransferError::Connection(err.to_string()),
        }
    }

    /// The pool could not provide a session for this item. Not retried.
    pub fn session_unavailable(err: ConnectionError) -> Self {
        TransferError::Other(format!("no session available: {err}"))
    }
}
