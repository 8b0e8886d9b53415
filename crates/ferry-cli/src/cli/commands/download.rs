//! `ferry download`: fetch a remote directory.

use anyhow::Result;
use ferry_core::backend::StorageBackend;
use ferry_core::client::{RunReport, TransferClient};
use ferry_core::listing::ExtensionFilter;
use std::path::PathBuf;
use std::sync::Arc;

use super::on_engine;

pub async fn run_download<B: StorageBackend + 'static>(
    client: &Arc<TransferClient<B>>,
    remote_path: String,
    local_path: PathBuf,
    extensions: Vec<String>,
    max_workers: Option<usize>,
) -> Result<RunReport> {
    let filter = ExtensionFilter::new(&extensions);
    println!(
        "Downloading {} -> {} [{}]",
        remote_path,
        local_path.display(),
        filter.suffixes().join(" ")
    );
    on_engine(client, move |c| {
        c.download_directory(&remote_path, &local_path, filter, max_workers)
    })
    .await?
}
