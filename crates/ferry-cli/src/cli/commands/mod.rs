//! CLI command handlers. Each command is in its own file.

mod download;
mod progress;
mod test_connection;
mod upload;

use anyhow::{Context, Result};
use ferry_core::backend::StorageBackend;
use ferry_core::client::{RunReport, TransferClient};
use ferry_core::control::CancelToken;
use ferry_core::verdict::Verdict;
use std::sync::Arc;

pub use download::run_download;
pub use progress::{format_bytes, spawn_printer};
pub use test_connection::run_test;
pub use upload::run_upload;

/// Run blocking engine work off the async runtime.
pub async fn on_engine<B, T, F>(client: &Arc<TransferClient<B>>, f: F) -> Result<T>
where
    B: StorageBackend + 'static,
    T: Send + 'static,
    F: FnOnce(&TransferClient<B>) -> T + Send + 'static,
{
    let client = Arc::clone(client);
    tokio::task::spawn_blocking(move || f(&client))
        .await
        .context("transfer engine task failed")
}

/// First Ctrl-C stops new transfers; in-flight ones finish.
pub fn watch_ctrl_c(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted: finishing in-flight transfers, no new ones will start.");
            tracing::warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });
}

pub fn print_report(report: &RunReport) {
    let r = &report.result;
    println!();
    println!("{} finished: {}", capitalize(&r.direction.to_string()), report.verdict);
    println!(
        "  total {}, successful {}, failed {}, corrupted {}, not started {}",
        r.total, r.successful, r.failed, r.corrupted, r.not_started
    );
    println!(
        "  {} in {:.1}s ({:.1}% success)",
        format_bytes(r.bytes_transferred),
        r.elapsed.as_secs_f64(),
        r.success_rate()
    );
    if !r.failed_items.is_empty() {
        println!("  failed: {}", r.failed_items);
    }
    if !r.corrupted_items.is_empty() {
        println!("  corrupted: {}", r.corrupted_items);
    }
    if let Some(note) = &report.note {
        println!("  note: {note}");
    }
    if let Some(warning) = degraded_warning(report) {
        eprintln!("{warning}");
    }
}

/// Warning printed for a degraded run, pointing at a re-run.
pub fn degraded_warning(report: &RunReport) -> Option<String> {
    if report.verdict != Verdict::DegradedSuccess {
        return None;
    }
    let r = &report.result;
    Some(format!(
        "warning: {} completed with failures ({:.1}% success, {} failed, {} corrupted); re-run to retry the rest",
        r.direction,
        r.success_rate(),
        r.failed,
        r.corrupted
    ))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
