//! `ferry upload`: mirror a local tree to a remote directory.

use anyhow::Result;
use ferry_core::backend::StorageBackend;
use ferry_core::client::{RunReport, TransferClient};
use std::path::PathBuf;
use std::sync::Arc;

use super::on_engine;

pub async fn run_upload<B: StorageBackend + 'static>(
    client: &Arc<TransferClient<B>>,
    local_path: PathBuf,
    remote_path: String,
    max_workers: Option<usize>,
) -> Result<RunReport> {
    println!("Uploading {} -> {}", local_path.display(), remote_path);
    on_engine(client, move |c| c.upload_directory(&local_path, &remote_path, max_workers)).await?
}
