//! Session pool shared by the workers of one client.
//!
//! Sessions are expensive (TCP + login, TLS + signing), so idle ones are kept
//! in a bounded set and re-validated before reuse. The mutex only guards set
//! membership; probes, connects and closes always run outside the lock.

mod guard;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::backend::{Liveness, StorageBackend};
use crate::error::ConnectionError;

pub use guard::PooledSession;

/// Default number of idle sessions kept per client.
pub const DEFAULT_POOL_CAPACITY: usize = 10;

/// A protocol session plus the bookkeeping the pool needs.
#[derive(Debug)]
pub struct Session<S> {
    id: u64,
    handle: S,
    validated_at: Instant,
}

impl<S> Session<S> {
    /// Pool-unique identifier (1-based, never reused).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When the session last passed a liveness probe (or was created).
    pub fn validated_at(&self) -> Instant {
        self.validated_at
    }

    pub fn handle(&mut self) -> &mut S {
        &mut self.handle
    }
}

/// Counters for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub created: u64,
    pub reused: u64,
    pub discarded: u64,
    pub idle: usize,
}

/// Bounded pool of idle sessions for one backend.
pub struct SessionPool<B: StorageBackend> {
    backend: Arc<B>,
    idle: Mutex<Vec<Session<B::Session>>>,
    capacity: usize,
    next_id: AtomicU64,
    created: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

impl<B: StorageBackend> SessionPool<B> {
    pub fn new(backend: Arc<B>, capacity: usize) -> Self {
        Self {
            backend,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            next_id: AtomicU64::new(1),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            idle: self.lock_idle().len(),
        }
    }

    /// Check out a live session: a validated idle one if available, otherwise
    /// a freshly connected one. Dead idle sessions are closed silently.
    pub fn acquire(&self) -> Result<PooledSession<'_, B>, ConnectionError> {
        loop {
            let candidate = self.lock_idle().pop();
            let Some(mut session) = candidate else {
                break;
            };
            match self.backend.probe(&mut session.handle) {
                Liveness::Alive => {
                    let idle_ms = session.validated_at().elapsed().as_millis() as u64;
                    session.validated_at = Instant::now();
                    self.reused.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(session = session.id, idle_ms, "reusing pooled session");
                    return Ok(PooledSession::new(self, session));
                }
                Liveness::Dead => {
                    tracing::debug!(session = session.id, "discarding dead idle session");
                    self.discard(session);
                }
            }
        }

        let handle = self.backend.connect()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = id, endpoint = %self.backend.describe(), "opened new session");
        Ok(PooledSession::new(
            self,
            Session {
                id,
                handle,
                validated_at: Instant::now(),
            },
        ))
    }

    /// Return a session: keep it if it is alive and there is room, otherwise close it.
    pub(crate) fn release(&self, mut session: Session<B::Session>) {
        if self.backend.probe(&mut session.handle) == Liveness::Dead {
            tracing::debug!(session = session.id, "released session failed probe");
            self.discard(session);
            return;
        }
        session.validated_at = Instant::now();
        let overflow = {
            let mut idle = self.lock_idle();
            if idle.len() < self.capacity {
                idle.push(session);
                None
            } else {
                Some(session)
            }
        };
        if let Some(session) = overflow {
            tracing::trace!(session = session.id, "pool full, closing session");
            self.backend.close(session.handle);
        }
    }

    /// Close a session without offering it back to the pool.
    pub(crate) fn discard(&self, session: Session<B::Session>) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
        self.backend.close(session.handle);
    }

    /// Close every idle session. Returns how many were closed.
    pub fn drain(&self) -> usize {
        let sessions = std::mem::take(&mut *self.lock_idle());
        let n = sessions.len();
        for session in sessions {
            self.backend.close(session.handle);
        }
        if n > 0 {
            tracing::debug!(closed = n, "drained session pool");
        }
        n
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<Session<B::Session>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: StorageBackend> Drop for SessionPool<B> {
    fn drop(&mut self) {
        self.drain();
    }
}

#[cfg(test)]
mod tests;
