//! In-memory backend for unit tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::backend::{ChunkPlan, ListError, ListPage, Liveness, RemoteEntry, StorageBackend};
use crate::error::{ConnectionError, TransferError};
use crate::progress::ProgressSink;
use crate::retry::{error_for, ErrorKind};

#[derive(Debug)]
pub(crate) struct MockSession {
    pub serial: u64,
}

pub(crate) struct MockBackend {
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
    pub failures: Mutex<HashMap<String, VecDeque<ErrorKind>>>,
    pub missing_prefixes: Mutex<BTreeSet<String>>,
    pub dirs: Mutex<BTreeSet<String>>,
    pub panic_keys: Mutex<BTreeSet<String>>,
    pub alive: AtomicBool,
    pub refuse_connect: AtomicBool,
    pub connects: AtomicU64,
    pub closes: AtomicU64,
    pub probes: AtomicU64,
    pub list_calls: AtomicU64,
    pub chunked_uploads: AtomicU64,
    pub page_size: usize,
    /// Called with the key at the start of every read/write.
    pub hook: Mutex<Option<Box<dyn Fn(&str) + Send>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(HashMap::new()),
            missing_prefixes: Mutex::new(BTreeSet::new()),
            dirs: Mutex::new(BTreeSet::new()),
            panic_keys: Mutex::new(BTreeSet::new()),
            alive: AtomicBool::new(true),
            refuse_connect: AtomicBool::new(false),
            connects: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            probes: AtomicU64::new(0),
            list_calls: AtomicU64::new(0),
            chunked_uploads: AtomicU64::new(0),
            page_size: 1000,
            hook: Mutex::new(None),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn put(&self, key: &str, body: &[u8]) {
        self.objects.lock().unwrap().insert(key.to_string(), body.to_vec());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Fail the next `kinds.len()` reads/writes of `key` with these kinds.
    pub fn fail_next(&self, key: &str, kinds: &[ErrorKind]) {
        self.failures
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .extend(kinds.iter().copied());
    }

    pub fn on_access(&self, hook: impl Fn(&str) + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    fn scripted_failure(&self, key: &str) -> Option<TransferError> {
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(key);
        }
        if self.panic_keys.lock().unwrap().contains(key) {
            panic!("mock backend exploded on {key}");
        }
        let kind = self.failures.lock().unwrap().get_mut(key)?.pop_front()?;
        Some(error_for(kind, format!("scripted failure for {key}")))
    }
}

impl StorageBackend for MockBackend {
    type Session = MockSession;

    fn describe(&self) -> String {
        "mock://".to_string()
    }

    fn connect(&self) -> Result<MockSession, ConnectionError> {
        if self.refuse_connect.load(Ordering::Relaxed) {
            return Err(ConnectionError::Unreachable("mock refused".into()));
        }
        let serial = self.connects.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(MockSession { serial })
    }

    fn probe(&self, _session: &mut MockSession) -> Liveness {
        self.probes.fetch_add(1, Ordering::Relaxed);
        if self.alive.load(Ordering::Relaxed) {
            Liveness::Alive
        } else {
            Liveness::Dead
        }
    }

    fn close(&self, _session: MockSession) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }

    fn size(&self, _session: &mut MockSession, key: &str) -> Option<u64> {
        self.objects.lock().unwrap().get(key).map(|b| b.len() as u64)
    }

    fn read_stream(
        &self,
        _session: &mut MockSession,
        key: &str,
        writer: &mut dyn Write,
    ) -> Result<u64, TransferError> {
        if let Some(e) = self.scripted_failure(key) {
            return Err(e);
        }
        let body = self
            .get(key)
            .ok_or_else(|| TransferError::NotFound(key.to_string()))?;
        writer.write_all(&body)?;
        Ok(body.len() as u64)
    }

    fn write_stream(
        &self,
        _session: &mut MockSession,
        key: &str,
        reader: &mut dyn Read,
        _len: u64,
    ) -> Result<u64, TransferError> {
        if let Some(e) = self.scripted_failure(key) {
            return Err(e);
        }
        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;
        let n = body.len() as u64;
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(n)
    }

    fn write_chunked(
        &self,
        _session: &mut MockSession,
        key: &str,
        source: &Path,
        _plan: &ChunkPlan,
        progress: &ProgressSink,
    ) -> Result<u64, TransferError> {
        self.chunked_uploads.fetch_add(1, Ordering::Relaxed);
        let body = std::fs::read(source)?;
        let n = body.len() as u64;
        progress.add(n);
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(n)
    }

    fn ensure_remote_dir(&self, _session: &mut MockSession, path: &str) -> Result<(), TransferError> {
        self.dirs.lock().unwrap().insert(path.to_string());
        Ok(())
    }

    fn list(
        &self,
        _session: &mut MockSession,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage, ListError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        if self.missing_prefixes.lock().unwrap().contains(prefix) {
            return Err(ListError::NotFound);
        }
        let start: usize = token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let all: Vec<RemoteEntry> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| RemoteEntry::file(k.clone(), v.len() as u64))
            .collect();
        let end = (start + self.page_size).min(all.len());
        let next_token = (end < all.len()).then(|| end.to_string());
        Ok(ListPage {
            entries: all[start.min(end)..end].to_vec(),
            next_token,
        })
    }
}
