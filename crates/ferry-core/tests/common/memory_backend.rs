//! In-memory object store implementing `StorageBackend` for integration tests.
//!
//! Keys can be scripted to fail with a given error kind (once or forever) or
//! to panic mid-transfer. Listing pages are `page_size` entries long.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ferry_core::backend::{ListError, ListPage, Liveness, RemoteEntry, StorageBackend};
use ferry_core::error::{ConnectionError, TransferError};
use ferry_core::retry::{error_for, ErrorKind};

pub struct MemorySession;

#[derive(Default)]
pub struct MemoryBackend {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    always_fail: Mutex<HashMap<String, ErrorKind>>,
    fail_once: Mutex<HashMap<String, Vec<ErrorKind>>>,
    panics: Mutex<HashSet<String>>,
    page_size: Option<usize>,
    pub connects: AtomicU64,
    pub reads: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    pub fn insert(&self, key: &str, body: &[u8]) {
        self.objects.lock().unwrap().insert(key.to_string(), body.to_vec());
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Every access to `key` fails with `kind`.
    pub fn fail_always(&self, key: &str, kind: ErrorKind) {
        self.always_fail.lock().unwrap().insert(key.to_string(), kind);
    }

    /// The next accesses to `key` fail with `kinds`, in order.
    pub fn fail_then_succeed(&self, key: &str, kinds: &[ErrorKind]) {
        let mut queued: Vec<ErrorKind> = kinds.to_vec();
        queued.reverse();
        self.fail_once.lock().unwrap().insert(key.to_string(), queued);
    }

    pub fn panic_on(&self, key: &str) {
        self.panics.lock().unwrap().insert(key.to_string());
    }

    fn check(&self, key: &str) -> Result<(), TransferError> {
        if self.panics.lock().unwrap().contains(key) {
            panic!("simulated driver bug on {key}");
        }
        if let Some(kind) = self.always_fail.lock().unwrap().get(key) {
            return Err(error_for(*kind, format!("{key} is scripted to fail")));
        }
        if let Some(kind) = self.fail_once.lock().unwrap().get_mut(key).and_then(Vec::pop) {
            return Err(error_for(kind, format!("{key} scripted transient failure")));
        }
        Ok(())
    }
}

impl StorageBackend for MemoryBackend {
    type Session = MemorySession;

    fn describe(&self) -> String {
        "memory://test".to_string()
    }

    fn connect(&self) -> Result<MemorySession, ConnectionError> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        Ok(MemorySession)
    }

    fn probe(&self, _session: &mut MemorySession) -> Liveness {
        Liveness::Alive
    }

    fn close(&self, _session: MemorySession) {}

    fn size(&self, _session: &mut MemorySession, key: &str) -> Option<u64> {
        self.objects.lock().unwrap().get(key).map(|b| b.len() as u64)
    }

    fn read_stream(
        &self,
        _session: &mut MemorySession,
        key: &str,
        writer: &mut dyn Write,
    ) -> Result<u64, TransferError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.check(key)?;
        let body = self
            .object(key)
            .ok_or_else(|| TransferError::NotFound(key.to_string()))?;
        writer.write_all(&body)?;
        Ok(body.len() as u64)
    }

    fn write_stream(
        &self,
        _session: &mut MemorySession,
        key: &str,
        reader: &mut dyn Read,
        _len: u64,
    ) -> Result<u64, TransferError> {
        self.check(key)?;
        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;
        let n = body.len() as u64;
        self.insert(key, &body);
        Ok(n)
    }

    fn ensure_remote_dir(&self, _session: &mut MemorySession, _path: &str) -> Result<(), TransferError> {
        Ok(())
    }

    fn list(
        &self,
        _session: &mut MemorySession,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, ListError> {
        let matching: Vec<RemoteEntry> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| RemoteEntry::file(k.clone(), v.len() as u64))
            .collect();
        if matching.is_empty() && !prefix.is_empty() {
            return Err(ListError::NotFound);
        }
        let page_size = self.page_size.unwrap_or(usize::MAX);
        let start: usize = token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = start.saturating_add(page_size).min(matching.len());
        Ok(ListPage {
            entries: matching[start.min(end)..end].to_vec(),
            next_token: (end < matching.len()).then(|| end.to_string()),
        })
    }
}
