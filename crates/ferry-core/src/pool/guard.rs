//! RAII guard that returns a checked-out session to the pool when dropped.

use super::{Session, SessionPool};
use crate::backend::StorageBackend;

/// Exclusive handle on one session. Dropping it releases the session back to
/// the pool (or closes it when `discard` was called), on every exit path.
pub struct PooledSession<'a, B: StorageBackend> {
    pool: &'a SessionPool<B>,
    session: Option<Session<B::Session>>,
    discard: bool,
}

impl<'a, B: StorageBackend> PooledSession<'a, B> {
    pub(super) fn new(pool: &'a SessionPool<B>, session: Session<B::Session>) -> Self {
        Self {
            pool,
            session: Some(session),
            discard: false,
        }
    }

    fn inner(&mut self) -> &mut Session<B::Session> {
        match self.session.as_mut() {
            Some(s) => s,
            None => unreachable!("pooled session used after release"),
        }
    }

    pub fn id(&self) -> u64 {
        self.session.as_ref().map(Session::id).unwrap_or_default()
    }

    pub fn handle(&mut self) -> &mut B::Session {
        self.inner().handle()
    }

    /// Close the session on drop instead of probing and re-pooling it.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl<B: StorageBackend> Drop for PooledSession<'_, B> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if self.discard {
                self.pool.discard(session);
            } else {
                self.pool.release(session);
            }
        }
    }
}
