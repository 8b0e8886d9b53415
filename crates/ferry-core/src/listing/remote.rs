//! Lazy, paging, filtered listing of a remote prefix.

use std::collections::{HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};

use crate::backend::{ListError, ListPage, RemoteEntry, StorageBackend};
use crate::control::CancelToken;
use crate::error::TransferError;
use crate::pool::SessionPool;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::transfer::WorkItem;

/// Case-insensitive suffix allow-list. Empty means every file passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    suffixes: Vec<String>,
}

impl ExtensionFilter {
    /// Accept every file.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build from extensions such as `.jpg`, `JPG` or `tiff`.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut suffixes: Vec<String> = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .map(|e| format!(".{e}"))
            .collect();
        suffixes.sort();
        suffixes.dedup();
        Self { suffixes }
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    pub fn matches(&self, key: &str) -> bool {
        if self.suffixes.is_empty() {
            return true;
        }
        let key = key.to_ascii_lowercase();
        self.suffixes.iter().any(|s| key.ends_with(s.as_str()))
    }
}

/// How a listing ended. Only meaningful once the iterator is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingStatus {
    /// Still paging.
    Pending,
    Complete,
    /// The prefix does not exist remotely.
    NotFound,
    /// A page request failed; entries seen before it were still yielded.
    Failed(String),
}

/// Iterator over the files under one remote prefix.
///
/// Page n+1 is requested only once page n has been consumed. Not restartable.
pub struct RemoteListing<'a, B: StorageBackend> {
    pool: &'a SessionPool<B>,
    prefix: String,
    filter: ExtensionFilter,
    retry: RetryPolicy,
    cancel: CancelToken,
    buffer: VecDeque<RemoteEntry>,
    token: Option<String>,
    pages: u32,
    status: ListingStatus,
}

impl<'a, B: StorageBackend> RemoteListing<'a, B> {
    pub fn open(pool: &'a SessionPool<B>, prefix: &str, filter: ExtensionFilter) -> Self {
        Self {
            pool,
            prefix: normalize_prefix(prefix),
            filter,
            retry: RetryPolicy::default(),
            cancel: CancelToken::new(),
            buffer: VecDeque::new(),
            token: None,
            pages: 0,
            status: ListingStatus::Pending,
        }
    }

    /// Retry transient page failures with `policy`; cancelling stops backoff.
    pub fn with_retry(mut self, policy: RetryPolicy, cancel: CancelToken) -> Self {
        self.retry = policy;
        self.cancel = cancel;
        self
    }

    /// Normalised prefix (no leading `/`, trailing `/` when non-empty).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn status(&self) -> &ListingStatus {
        &self.status
    }

    pub fn pages(&self) -> u32 {
        self.pages
    }

    /// Drain the listing into download work items rooted at `local_root`.
    ///
    /// Keys whose prefix-relative part is empty, absolute or escapes the root
    /// are skipped with a warning. So is a key whose local path was already
    /// claimed by an earlier key (`a//b.jpg` after `a/b.jpg`).
    pub fn collect_items(&mut self, local_root: &Path) -> Vec<WorkItem> {
        let prefix = self.prefix.clone();
        let mut items = Vec::new();
        let mut claimed: HashSet<PathBuf> = HashSet::new();
        for entry in self.by_ref() {
            let relative = entry.key.strip_prefix(prefix.as_str()).unwrap_or(&entry.key);
            let Some(rel) = sanitize_relative_key(relative) else {
                tracing::warn!(key = %entry.key, "skipping remote key with unsafe path");
                continue;
            };
            let local = local_root.join(rel);
            if !claimed.insert(local.clone()) {
                tracing::warn!(
                    key = %entry.key,
                    local = %local.display(),
                    "skipping remote key that maps to an already listed local file"
                );
                continue;
            }
            items.push(WorkItem::download(entry.key.clone(), local, Some(entry.size)));
        }
        items
    }

    fn fetch_page(&self) -> Result<ListPage, ListError> {
        let pool = self.pool;
        let prefix = self.prefix.as_str();
        let token = self.token.as_deref();
        let report = run_with_retry(&self.retry, &self.cancel, |_| {
            let mut session = pool.acquire().map_err(TransferError::session_unavailable)?;
            match pool.backend().list(session.handle(), prefix, token) {
                Ok(page) => Ok(Some(page)),
                Err(ListError::NotFound) => Ok(None),
                Err(ListError::Transfer(e)) => Err(e),
            }
        });
        match report.result {
            Ok(Some(page)) => Ok(page),
            Ok(None) => Err(ListError::NotFound),
            Err(e) => Err(ListError::Transfer(e)),
        }
    }

    fn refill(&mut self) {
        match self.fetch_page() {
            Ok(page) => {
                self.pages += 1;
                tracing::debug!(
                    prefix = %self.prefix,
                    page = self.pages,
                    entries = page.entries.len(),
                    "listed page"
                );
                self.buffer.extend(page.entries);
                self.token = page.next_token;
                if self.token.is_none() {
                    self.status = ListingStatus::Complete;
                }
            }
            Err(ListError::NotFound) => {
                tracing::warn!(prefix = %self.prefix, "remote path not found");
                self.status = ListingStatus::NotFound;
            }
            Err(ListError::Transfer(e)) => {
                tracing::warn!(prefix = %self.prefix, page = self.pages + 1, error = %e, "listing failed");
                self.status = ListingStatus::Failed(e.to_string());
            }
        }
    }

    fn keep(&self, entry: &RemoteEntry) -> bool {
        !entry.is_dir && !entry.key.ends_with('/') && self.filter.matches(&entry.key)
    }
}

impl<B: StorageBackend> Iterator for RemoteListing<'_, B> {
    type Item = RemoteEntry;

    fn next(&mut self) -> Option<RemoteEntry> {
        loop {
            while let Some(entry) = self.buffer.pop_front() {
                if self.keep(&entry) {
                    return Some(entry);
                }
            }
            if self.status != ListingStatus::Pending {
                return None;
            }
            self.refill();
        }
    }
}

pub(crate) fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Turn a `/`-separated key into a relative path that stays under its root.
fn sanitize_relative_key(relative: &str) -> Option<PathBuf> {
    if relative.is_empty() || relative.starts_with('/') || relative.contains('\\') {
        return None;
    }
    if relative.chars().any(char::is_control) {
        return None;
    }
    let mut out = PathBuf::new();
    for part in relative.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            _ => out.push(part),
        }
    }
    let safe = out.components().all(|c| matches!(c, Component::Normal(_)));
    (safe && out.components().next().is_some()).then_some(out)
}
