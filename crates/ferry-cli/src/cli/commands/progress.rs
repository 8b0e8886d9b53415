//! Prints engine progress events as items finish.

use ferry_core::progress::{ProgressEvent, RunProgress};
use ferry_core::transfer::Outcome;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const TALLY_INTERVAL: Duration = Duration::from_millis(500);

/// Drain `rx` on a blocking thread until every sender is dropped.
pub fn spawn_printer(rx: Receiver<ProgressEvent>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut last_tally = Instant::now();
        for event in rx {
            match event {
                ProgressEvent::Finished { item, outcome } => match outcome {
                    Outcome::Success { bytes } => println!("  ok    {item} ({})", format_bytes(bytes)),
                    Outcome::Failed { cause } => println!("  FAIL  {item}: {cause}"),
                    Outcome::Corrupted { reason } => println!("  BAD   {item}: {reason}"),
                },
                ProgressEvent::Tally(tally) => {
                    let done = tally.completed >= tally.total;
                    if done || last_tally.elapsed() >= TALLY_INTERVAL {
                        println!("{}", tally_line(&tally));
                        last_tally = Instant::now();
                    }
                }
                ProgressEvent::Started { .. } | ProgressEvent::Bytes { .. } => {}
            }
        }
    })
}

fn tally_line(t: &RunProgress) -> String {
    format!(
        "  [{}/{} {:.0}%] ok {} failed {} corrupted {}, {}",
        t.completed,
        t.total,
        t.fraction() * 100.0,
        t.successful,
        t.failed,
        t.corrupted,
        format_bytes(t.bytes)
    )
}

pub fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1_048_576.0;
    if bytes < 1024 {
        format!("{bytes} B")
    } else if (bytes as f64) < MIB {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MiB", bytes as f64 / MIB)
    }
}
