//! `ferry test`: connection check without transferring anything.

use anyhow::Result;
use ferry_core::backend::StorageBackend;
use ferry_core::client::TransferClient;
use std::sync::Arc;

use super::on_engine;

pub async fn run_test<B: StorageBackend + 'static>(
    client: &Arc<TransferClient<B>>,
    remote_path: String,
) -> Result<i32> {
    let shown = if remote_path.is_empty() { "/".to_string() } else { remote_path.clone() };
    match on_engine(client, move |c| c.test_connection(&remote_path)).await? {
        Ok(report) => {
            println!("Connection OK: {}", report.endpoint);
            if report.prefix_missing {
                println!("  {shown} does not exist");
            } else {
                let more = if report.more_pages { " (more pages available)" } else { "" };
                println!("  {} entries under {shown}{more}", report.first_page_entries);
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("Connection failed: {e}");
            Ok(1)
        }
    }
}
