use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::ChunkPlan;
use crate::orchestrator::{DEFAULT_DOWNLOAD_WORKERS, DEFAULT_UPLOAD_WORKERS};
use crate::pool::DEFAULT_POOL_CAPACITY;
use crate::transfer::{MultipartPolicy, DEFAULT_MULTIPART_THRESHOLD};
use crate::verdict::{Classifier, VerdictThresholds};

/// S3 refuses multipart parts below this size (except the last one).
pub const MIN_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Verdict for a run that found nothing to transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyRun {
    Success,
    Failure,
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub max_workers: usize,
    /// Extensions fetched when the command line gives none.
    pub extensions: Vec<String>,
    pub on_empty: EmptyRun,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_DOWNLOAD_WORKERS,
            extensions: [".jpg", ".jpeg", ".png", ".tiff", ".bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            on_empty: EmptyRun::Failure,
        }
    }
}

/// `[upload]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_workers: usize,
    /// Any failed item fails the run. When false the verdict thresholds apply.
    pub strict: bool,
    pub on_empty: EmptyRun,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_UPLOAD_WORKERS,
            strict: true,
            on_empty: EmptyRun::Success,
        }
    }
}

/// Retry policy parameters (`[retry]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per item (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 30,
        }
    }
}

/// `[verdict]` section: success-rate thresholds in (0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictConfig {
    pub success_rate: f64,
    pub degraded_rate: f64,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.90,
            degraded_rate: 0.70,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle sessions kept per client.
    pub capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

/// `[multipart]` section: large-file upload strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipartConfig {
    /// Files strictly larger than this are uploaded in chunks.
    pub threshold_bytes: u64,
    pub chunk_size_bytes: u64,
    /// Parts in flight per file.
    pub concurrency: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        let plan = ChunkPlan::default();
        Self {
            threshold_bytes: DEFAULT_MULTIPART_THRESHOLD,
            chunk_size_bytes: plan.chunk_size,
            concurrency: plan.concurrency,
        }
    }
}

/// `[ftp]` section. Credentials come from flags or the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    /// Storage zone; also the login user name.
    pub zone: Option<String>,
    pub timeout_secs: u64,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: "storage.bunnycdn.com".to_string(),
            port: 21,
            zone: None,
            timeout_secs: 30,
        }
    }
}

/// `[s3]` section. Keys come from flags or the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: Option<String>,
    pub timeout_secs: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "https://nbg1.your-objectstorage.com".to_string(),
            region: "nbg1".to_string(),
            bucket: None,
            timeout_secs: 60,
        }
    }
}

/// Global configuration loaded from `~/.config/ferry/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FerryConfig {
    pub download: DownloadConfig,
    pub upload: UploadConfig,
    pub retry: RetryConfig,
    pub verdict: VerdictConfig,
    pub pool: PoolConfig,
    pub multipart: MultipartConfig,
    pub ftp: FtpConfig,
    pub s3: S3Config,
}

impl FerryConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.download.max_workers == 0 || self.upload.max_workers == 0 {
            bail!("max_workers must be at least 1");
        }
        if self.pool.capacity == 0 {
            bail!("pool.capacity must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if !self.retry.base_delay_secs.is_finite() || self.retry.base_delay_secs < 0.0 {
            bail!("retry.base_delay_secs must be a non-negative number");
        }
        if self.multipart.chunk_size_bytes < MIN_CHUNK_SIZE {
            bail!(
                "multipart.chunk_size_bytes must be at least {} (got {})",
                MIN_CHUNK_SIZE,
                self.multipart.chunk_size_bytes
            );
        }
        if self.multipart.concurrency == 0 {
            bail!("multipart.concurrency must be at least 1");
        }
        self.thresholds()?;
        Ok(())
    }

    pub fn thresholds(&self) -> Result<VerdictThresholds> {
        Ok(VerdictThresholds::new(
            self.verdict.success_rate,
            self.verdict.degraded_rate,
        )?)
    }

    pub fn download_classifier(&self) -> Result<Classifier> {
        Ok(Classifier::new(self.thresholds()?))
    }

    pub fn upload_classifier(&self) -> Result<Classifier> {
        Ok(Classifier::new(self.thresholds()?).strict(self.upload.strict))
    }

    pub fn multipart_policy(&self) -> MultipartPolicy {
        MultipartPolicy {
            threshold: self.multipart.threshold_bytes,
            plan: ChunkPlan {
                chunk_size: self.multipart.chunk_size_bytes,
                concurrency: self.multipart.concurrency,
            },
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ferry")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FerryConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FerryConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load an explicit config file. Missing files are an error.
pub fn load_from(path: &Path) -> Result<FerryConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: FerryConfig =
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = FerryConfig::default();
        assert_eq!(cfg.download.max_workers, 4);
        assert_eq!(cfg.upload.max_workers, 2);
        assert!(cfg.upload.strict);
        assert_eq!(cfg.pool.capacity, 10);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.ftp.host, "storage.bunnycdn.com");
        assert_eq!(cfg.s3.region, "nbg1");
        assert_eq!(cfg.download.on_empty, EmptyRun::Failure);
        assert_eq!(cfg.upload.on_empty, EmptyRun::Success);
        cfg.validate().unwrap();
    }

    #[test]
    fn default_config_survives_toml() {
        let cfg = FerryConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: FerryConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn sections_are_optional() {
        let toml = r#"
            [download]
            max_workers = 8

            [retry]
            max_attempts = 5
            base_delay_secs = 0.5
            max_delay_secs = 15
        "#;
        let cfg: FerryConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.download.max_workers, 8);
        assert_eq!(cfg.download.extensions.len(), 5);
        assert_eq!(cfg.upload, UploadConfig::default());
        assert_eq!(cfg.retry.max_attempts, 5);
        assert!((cfg.retry.base_delay_secs - 0.5).abs() < 1e-9);
        assert_eq!(cfg.retry.max_delay_secs, 15);
    }

    #[test]
    fn empty_run_policy_parses_lowercase() {
        let cfg: FerryConfig = toml::from_str("[upload]\non_empty = \"failure\"\nstrict = false").unwrap();
        assert_eq!(cfg.upload.on_empty, EmptyRun::Failure);
        assert!(!cfg.upload.strict);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = FerryConfig::default();
        cfg.download.max_workers = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = FerryConfig::default();
        cfg.verdict.degraded_rate = 0.95;
        assert!(cfg.validate().is_err());

        let mut cfg = FerryConfig::default();
        cfg.multipart.chunk_size_bytes = 1024;
        assert!(cfg.validate().is_err());

        let mut cfg = FerryConfig::default();
        cfg.pool.capacity = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_from_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pool]\ncapacity = 0\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("pool.capacity"));
        assert!(load_from(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn multipart_policy_from_config() {
        let mut cfg = FerryConfig::default();
        cfg.multipart.threshold_bytes = 64 * 1024 * 1024;
        let policy = cfg.multipart_policy();
        assert_eq!(policy.threshold, 64 * 1024 * 1024);
        assert_eq!(policy.plan.chunk_size, 8 * 1024 * 1024);
    }
}
