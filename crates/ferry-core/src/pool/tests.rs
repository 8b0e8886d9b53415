use super::*;
use crate::testing::MockBackend;
use std::collections::HashSet;
use std::sync::atomic::Ordering;

fn pool(capacity: usize) -> SessionPool<MockBackend> {
    SessionPool::new(Arc::new(MockBackend::new()), capacity)
}

#[test]
fn released_session_is_reused() {
    let pool = pool(4);
    let first_id = {
        let session = pool.acquire().unwrap();
        session.id()
    };
    let mut again = pool.acquire().unwrap();
    assert_eq!(again.id(), first_id);
    assert_eq!(again.handle().serial, 1);
    drop(again);
    let stats = pool.stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.reused, 1);
    assert_eq!(stats.idle, 1);
}

#[test]
fn release_refreshes_validation_time() {
    let pool = pool(2);
    let session = pool.acquire().unwrap();
    let before_release = Instant::now();
    drop(session);
    let idle = pool.lock_idle();
    assert_eq!(idle.len(), 1);
    assert!(idle[0].validated_at() >= before_release);
}

#[test]
fn dead_idle_session_is_replaced_silently() {
    let pool = pool(4);
    drop(pool.acquire().unwrap());
    assert_eq!(pool.stats().idle, 1);

    pool.backend().alive.store(false, Ordering::Relaxed);
    let fresh = pool.acquire().unwrap();
    assert_eq!(fresh.id(), 2);
    assert_eq!(pool.stats().discarded, 1);
    assert_eq!(pool.backend().connects.load(Ordering::Relaxed), 2);
}

#[test]
fn dead_session_is_not_returned_to_pool() {
    let pool = pool(4);
    let session = pool.acquire().unwrap();
    pool.backend().alive.store(false, Ordering::Relaxed);
    drop(session);
    assert_eq!(pool.stats().idle, 0);
    assert_eq!(pool.backend().closes.load(Ordering::Relaxed), 1);
}

#[test]
fn full_pool_closes_returned_sessions() {
    let pool = pool(2);
    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    let c = pool.acquire().unwrap();
    drop(a);
    drop(b);
    drop(c);
    assert_eq!(pool.stats().idle, 2);
    assert_eq!(pool.backend().closes.load(Ordering::Relaxed), 1);
}

#[test]
fn discarded_session_skips_probe() {
    let pool = pool(2);
    let mut session = pool.acquire().unwrap();
    session.discard();
    let probes_before = pool.backend().probes.load(Ordering::Relaxed);
    drop(session);
    assert_eq!(pool.backend().probes.load(Ordering::Relaxed), probes_before);
    assert_eq!(pool.stats().idle, 0);
    assert_eq!(pool.stats().discarded, 1);
}

#[test]
fn connect_failure_surfaces_as_connection_error() {
    let pool = pool(2);
    pool.backend().refuse_connect.store(true, Ordering::Relaxed);
    assert!(matches!(
        pool.acquire().err(),
        Some(ConnectionError::Unreachable(_))
    ));
}

#[test]
fn drain_closes_idle_sessions() {
    let pool = pool(4);
    let a = pool.acquire().unwrap();
    let b = pool.acquire().unwrap();
    drop(a);
    drop(b);
    assert_eq!(pool.drain(), 2);
    assert_eq!(pool.stats().idle, 0);
    assert_eq!(pool.backend().closes.load(Ordering::Relaxed), 2);
}

#[test]
fn concurrent_acquire_never_double_checks_out() {
    let pool = pool(3);
    let in_use = Mutex::new(HashSet::new());
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..200 {
                    let session = pool.acquire().unwrap();
                    let id = session.id();
                    assert!(
                        in_use.lock().unwrap().insert(id),
                        "session {id} checked out twice"
                    );
                    std::thread::yield_now();
                    in_use.lock().unwrap().remove(&id);
                    drop(session);
                }
            });
        }
    });
    let stats = pool.stats();
    assert!(stats.idle <= 3);
    assert!(stats.created >= 1);
}
