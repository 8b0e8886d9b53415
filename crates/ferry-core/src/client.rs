//! Transfer client: one backend, its session pool, and directory-level
//! operations built from the lister, walker, orchestrator and classifier.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::backend::{ListError, StorageBackend};
use crate::config::{EmptyRun, FerryConfig};
use crate::control::{CancelToken, RunCancelled};
use crate::error::ConnectionError;
use crate::listing::remote::normalize_prefix;
use crate::listing::{upload_items, ExtensionFilter, ListingStatus, RemoteListing};
use crate::orchestrator::{Orchestrator, RunResult};
use crate::pool::{PoolStats, SessionPool};
use crate::progress::ProgressEvent;
use crate::retry::RetryPolicy;
use crate::transfer::{Direction, MultipartPolicy};
use crate::verdict::{Classifier, Verdict};

/// Engine settings derived from `FerryConfig`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub retry: RetryPolicy,
    pub multipart: MultipartPolicy,
    pub pool_capacity: usize,
    pub download_workers: usize,
    pub upload_workers: usize,
    pub download_classifier: Classifier,
    pub upload_classifier: Classifier,
    pub download_on_empty: EmptyRun,
    pub upload_on_empty: EmptyRun,
}

impl ClientOptions {
    pub fn from_config(cfg: &FerryConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            retry: RetryPolicy::from_config(&cfg.retry),
            multipart: cfg.multipart_policy(),
            pool_capacity: cfg.pool.capacity,
            download_workers: cfg.download.max_workers,
            upload_workers: cfg.upload.max_workers,
            download_classifier: cfg.download_classifier()?,
            upload_classifier: cfg.upload_classifier()?,
            download_on_empty: cfg.download.on_empty,
            upload_on_empty: cfg.upload.on_empty,
        })
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        let cfg = FerryConfig::default();
        Self {
            retry: RetryPolicy::from_config(&cfg.retry),
            multipart: cfg.multipart_policy(),
            pool_capacity: cfg.pool.capacity,
            download_workers: cfg.download.max_workers,
            upload_workers: cfg.upload.max_workers,
            download_classifier: Classifier::default(),
            upload_classifier: Classifier::default().strict(cfg.upload.strict),
            download_on_empty: cfg.download.on_empty,
            upload_on_empty: cfg.upload.on_empty,
        }
    }
}

/// What the up-front connection test saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub endpoint: String,
    /// Entries on the first listing page of the probed prefix.
    pub first_page_entries: usize,
    pub more_pages: bool,
    /// The probed prefix does not exist (the session itself is fine).
    pub prefix_missing: bool,
}

/// Result of one directory-level operation.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub result: RunResult,
    pub verdict: Verdict,
    /// Why the verdict differs from what the counts alone would give.
    pub note: Option<String>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }
}

/// Owns a backend and its pool. Sessions live across calls until `shutdown`.
pub struct TransferClient<B: StorageBackend> {
    pool: SessionPool<B>,
    options: ClientOptions,
    cancel: CancelToken,
    progress: Option<Sender<ProgressEvent>>,
}

impl<B: StorageBackend> TransferClient<B> {
    pub fn new(backend: B, options: ClientOptions) -> Self {
        Self::from_arc(Arc::new(backend), options)
    }

    pub fn from_arc(backend: Arc<B>, options: ClientOptions) -> Self {
        let pool = SessionPool::new(backend, options.pool_capacity);
        Self {
            pool,
            options,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Sender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn pool(&self) -> &SessionPool<B> {
        &self.pool
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Connect, probe, and list the first page under `prefix`.
    pub fn test_connection(&self, prefix: &str) -> Result<ConnectionReport, ConnectionError> {
        let mut session = self.pool.acquire()?;
        let backend = self.pool.backend();
        let endpoint = backend.describe();
        let prefix = normalize_prefix(prefix);
        let report = match backend.list(session.handle(), &prefix, None) {
            Ok(page) => ConnectionReport {
                endpoint,
                first_page_entries: page.entries.len(),
                more_pages: page.next_token.is_some(),
                prefix_missing: false,
            },
            Err(ListError::NotFound) => ConnectionReport {
                endpoint,
                first_page_entries: 0,
                more_pages: false,
                prefix_missing: true,
            },
            Err(ListError::Transfer(e)) => {
                session.discard();
                return Err(ConnectionError::Rejected(format!("listing {prefix:?} failed: {e}")));
            }
        };
        tracing::info!(
            endpoint = %report.endpoint,
            entries = report.first_page_entries,
            prefix_missing = report.prefix_missing,
            "connection test passed"
        );
        Ok(report)
    }

    /// Download every matching object under `remote_prefix` into `local_dir`.
    pub fn download_directory(
        &self,
        remote_prefix: &str,
        local_dir: &Path,
        filter: ExtensionFilter,
        max_workers: Option<usize>,
    ) -> Result<RunReport> {
        self.test_connection(remote_prefix)
            .context("connection test failed")?;
        fs::create_dir_all(local_dir)
            .with_context(|| format!("creating local directory {}", local_dir.display()))?;

        let mut listing = RemoteListing::open(&self.pool, remote_prefix, filter)
            .with_retry(self.options.retry, self.cancel.clone());
        let items = listing.collect_items(local_dir);
        let status = listing.status().clone();
        tracing::info!(prefix = %listing.prefix(), items = items.len(), status = ?status, "listing done");

        let workers = max_workers.unwrap_or(self.options.download_workers);
        let result = self.orchestrator().run(items, Direction::Download, workers);

        let mut verdict = self.options.download_classifier.classify(&result);
        let mut note = None;
        if result.attempted() == 0 && !result.cancelled {
            verdict = empty_verdict(self.options.download_on_empty);
            note = Some(match &status {
                ListingStatus::NotFound => format!("no files found: {remote_prefix} does not exist"),
                _ => "no files found".to_string(),
            });
        }
        if let ListingStatus::Failed(reason) = &status {
            verdict = Verdict::Failure;
            note = Some(format!("remote listing incomplete: {reason}"));
        }
        Ok(self.finish(result, verdict, note))
    }

    /// Upload every file under `local_dir` to keys under `remote_prefix`.
    pub fn upload_directory(
        &self,
        local_dir: &Path,
        remote_prefix: &str,
        max_workers: Option<usize>,
    ) -> Result<RunReport> {
        if !local_dir.is_dir() {
            bail!("local directory {} does not exist", local_dir.display());
        }
        self.test_connection("").context("connection test failed")?;

        let items = upload_items(local_dir, remote_prefix);
        tracing::info!(root = %local_dir.display(), items = items.len(), "local walk done");

        let workers = max_workers.unwrap_or(self.options.upload_workers);
        let result = self.orchestrator().run(items, Direction::Upload, workers);

        let mut verdict = self.options.upload_classifier.classify(&result);
        let mut note = None;
        if result.attempted() == 0 && !result.cancelled {
            verdict = empty_verdict(self.options.upload_on_empty);
            tracing::warn!(root = %local_dir.display(), "no files to upload");
            note = Some("no files to upload".to_string());
        }
        Ok(self.finish(result, verdict, note))
    }

    /// Close every pooled session. Returns the final pool counters.
    pub fn shutdown(&self) -> PoolStats {
        let closed = self.pool.drain();
        let stats = self.pool.stats();
        tracing::debug!(
            closed,
            created = stats.created,
            reused = stats.reused,
            discarded = stats.discarded,
            "client shut down"
        );
        stats
    }

    fn orchestrator(&self) -> Orchestrator<'_, B> {
        Orchestrator::new(&self.pool)
            .with_retry(self.options.retry)
            .with_multipart(self.options.multipart)
            .with_cancel(self.cancel.clone())
            .with_progress(self.progress.clone())
    }

    fn finish(&self, result: RunResult, mut verdict: Verdict, mut note: Option<String>) -> RunReport {
        if result.cancelled {
            verdict = Verdict::Failure;
            note = Some(RunCancelled.to_string());
        }
        match verdict {
            Verdict::Success => tracing::info!(%verdict, "run verdict"),
            Verdict::DegradedSuccess => tracing::warn!(
                %verdict,
                success_pct = result.success_rate(),
                "run completed with failures"
            ),
            Verdict::Failure => tracing::warn!(%verdict, note = note.as_deref().unwrap_or(""), "run failed"),
        }
        RunReport {
            result,
            verdict,
            note,
        }
    }
}

fn empty_verdict(policy: EmptyRun) -> Verdict {
    match policy {
        EmptyRun::Success => Verdict::Success,
        EmptyRun::Failure => Verdict::Failure,
    }
}
