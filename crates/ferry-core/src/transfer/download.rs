//! Download one remote object to a local file, then verify the file.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};

use super::{CorruptionReason, Outcome, TransferContext, WorkItem};
use crate::backend::StorageBackend;
use crate::error::TransferError;
use crate::progress::{ProgressSink, ProgressWriter};
use crate::retry::{classify, run_with_retry};

pub(super) fn run<B: StorageBackend>(
    ctx: &TransferContext<'_, B>,
    item: &WorkItem,
    sink: &ProgressSink,
) -> Outcome {
    let dest = item.local();
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent) {
            tracing::warn!(item = item.label(), error = %e, "cannot create destination directory");
            return Outcome::failed(TransferError::LocalIo(e));
        }
    }

    let report = run_with_retry(&ctx.retry, ctx.cancel, |attempt| {
        let mut session = ctx
            .pool
            .acquire()
            .map_err(TransferError::session_unavailable)?;
        let backend = ctx.pool.backend();
        let total = backend
            .size(session.handle(), item.remote())
            .or(item.expected_size())
            .unwrap_or(0);
        sink.reset();
        sink.set_total(total);
        if attempt == 1 {
            sink.started();
        }

        let result = write_to_file(backend, session.handle(), item, sink);
        if let Err(e) = &result {
            if classify(e).poisons_session() {
                session.discard();
            }
        }
        result
    });

    match report.result {
        Ok(bytes) => {
            tracing::debug!(item = item.label(), bytes, attempts = report.attempts, "download finished");
            verify(item)
        }
        Err(e) => {
            tracing::warn!(
                item = item.label(),
                attempts = report.attempts,
                error = %e,
                "download failed"
            );
            let _ = fs::remove_file(dest);
            Outcome::failed(e)
        }
    }
}

fn write_to_file<B: StorageBackend>(
    backend: &B,
    session: &mut B::Session,
    item: &WorkItem,
    sink: &ProgressSink,
) -> Result<u64, TransferError> {
    let file = File::create(item.local())?;
    let mut writer = ProgressWriter::new(BufWriter::new(file), sink.clone());
    let bytes = backend.read_stream(session, item.remote(), &mut writer)?;
    writer.flush()?;
    Ok(bytes)
}

/// A download only counts when the destination exists and is non-empty.
fn verify(item: &WorkItem) -> Outcome {
    match fs::metadata(item.local()) {
        Ok(meta) if meta.len() > 0 => Outcome::Success { bytes: meta.len() },
        Ok(_) => {
            tracing::warn!(item = item.label(), "downloaded file is empty");
            Outcome::Corrupted {
                reason: CorruptionReason::Empty,
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(item = item.label(), "downloaded file is missing");
            Outcome::Corrupted {
                reason: CorruptionReason::Missing,
            }
        }
        Err(e) => Outcome::failed(TransferError::LocalIo(e)),
    }
}
