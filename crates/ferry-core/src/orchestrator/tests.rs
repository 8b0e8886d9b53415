use super::*;
use crate::testing::MockBackend;
use crate::transfer::CorruptionReason;
use std::sync::Arc;
use std::time::Duration;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
    }
}

fn download_items(dir: &std::path::Path, keys: &[&str]) -> Vec<WorkItem> {
    keys.iter()
        .map(|k| WorkItem::download(*k, dir.join(k), None))
        .collect()
}

#[test]
fn counts_every_outcome_class() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new();
    backend.put("ok1.jpg", b"1");
    backend.put("ok2.jpg", b"22");
    backend.put("empty.jpg", b"");
    let pool = SessionPool::new(Arc::new(backend), 4);

    let result = Orchestrator::new(&pool).with_retry(fast_retry()).run(
        download_items(dir.path(), &["ok1.jpg", "ok2.jpg", "empty.jpg", "missing.jpg"]),
        Direction::Download,
        3,
    );

    assert_eq!(result.total, 4);
    assert_eq!(result.successful, 2);
    assert_eq!(result.corrupted, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.bytes_transferred, 3);
    assert_eq!(result.failed_items.items(), ["missing.jpg"]);
    assert_eq!(result.corrupted_items.items(), ["empty.jpg"]);
    assert!(!result.cancelled);
    assert_eq!(result.not_started, 0);
}

#[test]
fn empty_run_returns_immediately() {
    let pool = SessionPool::new(Arc::new(MockBackend::new()), 1);
    let result = Orchestrator::new(&pool).run(Vec::new(), Direction::Upload, 2);
    assert_eq!(result.attempted(), 0);
    assert_eq!(pool.stats().created, 0);
}

#[test]
fn panicking_transfer_becomes_failed_and_siblings_finish() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new();
    for k in ["a.jpg", "b.jpg", "c.jpg", "d.jpg"] {
        backend.put(k, b"data");
    }
    backend.panic_keys.lock().unwrap().insert("b.jpg".into());
    let pool = SessionPool::new(Arc::new(backend), 4);

    let result = Orchestrator::new(&pool).run(
        download_items(dir.path(), &["a.jpg", "b.jpg", "c.jpg", "d.jpg"]),
        Direction::Download,
        2,
    );

    assert_eq!(result.successful, 3);
    assert_eq!(result.failed, 1);
    assert_eq!(result.failed_items.items(), ["b.jpg"]);
}

#[test]
fn panic_cause_is_reported_as_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new();
    backend.put("boom.jpg", b"x");
    backend.panic_keys.lock().unwrap().insert("boom.jpg".into());
    let pool = SessionPool::new(Arc::new(backend), 1);
    let (tx, rx) = mpsc::channel();

    Orchestrator::new(&pool)
        .with_progress(Some(tx))
        .run(download_items(dir.path(), &["boom.jpg"]), Direction::Download, 1);

    let cause = rx.iter().find_map(|e| match e {
        ProgressEvent::Finished {
            outcome: Outcome::Failed { cause },
            ..
        } => Some(cause),
        _ => None,
    });
    let cause = cause.expect("finished event");
    assert!(cause.starts_with("internal error: "), "{cause}");
    assert!(cause.contains("exploded"));
}

#[test]
fn cancellation_stops_dispatch_and_counts_not_started() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new();
    let keys = ["0.jpg", "1.jpg", "2.jpg", "3.jpg", "4.jpg"];
    for k in keys {
        backend.put(k, b"z");
    }
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    backend.on_access(move |key| {
        if key == "2.jpg" {
            trigger.cancel();
        }
    });
    let pool = SessionPool::new(Arc::new(backend), 1);

    let result = Orchestrator::new(&pool)
        .with_cancel(cancel)
        .run(download_items(dir.path(), &keys), Direction::Download, 1);

    assert!(result.cancelled);
    assert_eq!(result.successful, 3);
    assert_eq!(result.not_started, 2);
    assert!(!dir.path().join("3.jpg").exists());
}

#[test]
fn tally_events_follow_each_completion() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new();
    backend.put("a.jpg", b"1");
    backend.put("b.jpg", b"");
    let pool = SessionPool::new(Arc::new(backend), 2);
    let (tx, rx) = mpsc::channel();

    Orchestrator::new(&pool)
        .with_progress(Some(tx))
        .run(download_items(dir.path(), &["a.jpg", "b.jpg"]), Direction::Download, 2);

    let tallies: Vec<_> = rx
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Tally(p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(tallies.len(), 2);
    let last = tallies[1];
    assert_eq!((last.completed, last.successful, last.corrupted, last.total), (2, 1, 1, 2));
}

#[test]
fn corrupted_reason_survives_to_finished_event() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new();
    backend.put("zero.png", b"");
    let pool = SessionPool::new(Arc::new(backend), 1);
    let (tx, rx) = mpsc::channel();

    Orchestrator::new(&pool)
        .with_progress(Some(tx))
        .run(download_items(dir.path(), &["zero.png"]), Direction::Download, 4);

    assert!(rx.iter().any(|e| matches!(
        e,
        ProgressEvent::Finished {
            outcome: Outcome::Corrupted {
                reason: CorruptionReason::Empty
            },
            ..
        }
    )));
}
