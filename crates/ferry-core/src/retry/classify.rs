//! Classify protocol replies and transfer errors into retry policy error kinds.

use crate::error::TransferError;
use crate::retry::policy::ErrorKind;

/// Classify an HTTP status code (S3-compatible endpoints) for retry decisions.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        408 => ErrorKind::Timeout,
        401 | 403 => ErrorKind::PermissionDenied,
        404 => ErrorKind::NotFound,
        500..=599 => ErrorKind::Server(code),
        _ => ErrorKind::Other,
    }
}

/// Classify an FTP reply code. 4xx replies are transient negatives by
/// protocol definition; 5xx are permanent.
pub fn classify_ftp_reply(code: u32) -> ErrorKind {
    match code {
        421 => ErrorKind::Throttled,
        425 | 426 => ErrorKind::Connection,
        400..=499 => ErrorKind::Server(code as u16),
        530 | 532 | 553 => ErrorKind::PermissionDenied,
        550 => ErrorKind::NotFound,
        _ => ErrorKind::Other,
    }
}

/// Classify a transfer error into an ErrorKind.
pub fn classify(e: &TransferError) -> ErrorKind {
    match e {
        TransferError::Timeout(_) => ErrorKind::Timeout,
        TransferError::Connection(_) => ErrorKind::Connection,
        TransferError::Throttled(_) => ErrorKind::Throttled,
        TransferError::Server { status, .. } => ErrorKind::Server(*status),
        TransferError::PermissionDenied(_) => ErrorKind::PermissionDenied,
        TransferError::NotFound(_) => ErrorKind::NotFound,
        TransferError::LocalIo(_) => ErrorKind::LocalIo,
        TransferError::Other(_) => ErrorKind::Other,
    }
}

/// Classify a socket-level I/O error raised while talking to the remote.
pub fn classify_io_error(e: &std::io::Error) -> ErrorKind {
    classify(&TransferError::from_remote_io(e))
}

/// Build the transfer error that carries `kind`. Inverse of `classify` for
/// every kind except `LocalIo`, which needs a real `io::Error`.
pub fn error_for(kind: ErrorKind, message: impl Into<String>) -> TransferError {
    let message = message.into();
    match kind {
        ErrorKind::Timeout => TransferError::Timeout(message),
        ErrorKind::Connection => TransferError::Connection(message),
        ErrorKind::Throttled => TransferError::Throttled(message),
        ErrorKind::Server(status) => TransferError::Server { status, message },
        ErrorKind::PermissionDenied => TransferError::PermissionDenied(message),
        ErrorKind::NotFound => TransferError::NotFound(message),
        ErrorKind::LocalIo => {
            TransferError::LocalIo(std::io::Error::new(std::io::ErrorKind::Other, message))
        }
        ErrorKind::Other => TransferError::Other(message),
    }
}
