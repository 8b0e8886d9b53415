//! Upload one local file to a remote key.

use std::fs::{self, File};
use std::io::BufReader;

use super::{Outcome, TransferContext, WorkItem};
use crate::backend::{remote_parent, StorageBackend};
use crate::error::TransferError;
use crate::progress::{ProgressReader, ProgressSink};
use crate::retry::{classify, run_with_retry};

pub(super) fn run<B: StorageBackend>(
    ctx: &TransferContext<'_, B>,
    item: &WorkItem,
    sink: &ProgressSink,
) -> Outcome {
    let len = match fs::metadata(item.local()) {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => return Outcome::failed(format!("{} is not a regular file", item.local().display())),
        Err(e) => {
            tracing::warn!(item = item.label(), error = %e, "upload source unreadable");
            return Outcome::failed(TransferError::LocalIo(e));
        }
    };
    let chunked = len > ctx.multipart.threshold;

    let report = run_with_retry(&ctx.retry, ctx.cancel, |attempt| {
        let mut session = ctx
            .pool
            .acquire()
            .map_err(TransferError::session_unavailable)?;
        sink.reset();
        sink.set_total(len);
        if attempt == 1 {
            sink.started();
        }

        let result = send(ctx, session.handle(), item, len, chunked, sink);
        if let Err(e) = &result {
            if classify(e).poisons_session() {
                session.discard();
            }
        }
        result
    });

    match report.result {
        Ok(bytes) => {
            tracing::debug!(
                item = item.label(),
                bytes,
                chunked,
                attempts = report.attempts,
                "upload finished"
            );
            Outcome::Success { bytes }
        }
        Err(e) => {
            tracing::warn!(
                item = item.label(),
                attempts = report.attempts,
                error = %e,
                "upload failed"
            );
            Outcome::failed(e)
        }
    }
}

fn send<B: StorageBackend>(
    ctx: &TransferContext<'_, B>,
    session: &mut B::Session,
    item: &WorkItem,
    len: u64,
    chunked: bool,
    sink: &ProgressSink,
) -> Result<u64, TransferError> {
    let backend = ctx.pool.backend();
    if let Some(parent) = remote_parent(item.remote()) {
        backend.ensure_remote_dir(session, parent)?;
    }
    if chunked {
        return backend.write_chunked(session, item.remote(), item.local(), &ctx.multipart.plan, sink);
    }
    let file = File::open(item.local())?;
    let mut reader = ProgressReader::new(BufReader::new(file), sink.clone());
    backend.write_stream(session, item.remote(), &mut reader, len)
}
