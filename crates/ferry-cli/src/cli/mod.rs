//! CLI for ferry bulk transfers.

mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ferry_core::backend::{FtpBackend, FtpSettings, S3Backend, S3Settings, StorageBackend};
use ferry_core::client::{ClientOptions, TransferClient};
use ferry_core::config::{self, FerryConfig, FtpConfig, S3Config};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use commands::{on_engine, print_report, run_download, run_test, run_upload, spawn_printer, watch_ctrl_c};

/// Top-level CLI for ferry.
#[derive(Debug, Parser)]
#[command(name = "ferry")]
#[command(about = "ferry: parallel bulk transfers to FTP storage zones and S3 buckets", long_about = None)]
pub struct Cli {
    /// Storage protocol to talk to.
    #[arg(long, value_enum, default_value_t = BackendKind::Ftp, global = true)]
    pub backend: BackendKind,

    /// Load this config file instead of ~/.config/ferry/config.toml.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logs when logging falls back to stderr.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub ftp: FtpArgs,

    #[command(flatten)]
    pub s3: S3Args,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Ftp,
    S3,
}

/// FTP storage zone options. Unset values fall back to the `[ftp]` section.
#[derive(Debug, Args)]
pub struct FtpArgs {
    #[arg(long = "ftp-host", value_name = "HOST", global = true)]
    pub host: Option<String>,

    #[arg(long = "ftp-port", value_name = "PORT", global = true)]
    pub port: Option<u16>,

    /// Storage zone name (login user).
    #[arg(long = "ftp-zone", env = "FERRY_FTP_ZONE", value_name = "ZONE", global = true)]
    pub zone: Option<String>,

    /// Storage zone API key (login password).
    #[arg(
        long = "ftp-api-key",
        env = "FERRY_FTP_API_KEY",
        hide_env_values = true,
        value_name = "KEY",
        global = true
    )]
    pub api_key: Option<String>,
}

impl FtpArgs {
    fn settings(&self, cfg: &FtpConfig) -> Result<FtpSettings> {
        let zone = self
            .zone
            .clone()
            .or_else(|| cfg.zone.clone())
            .context("storage zone missing: pass --ftp-zone or set FERRY_FTP_ZONE")?;
        let api_key = self
            .api_key
            .clone()
            .context("API key missing: pass --ftp-api-key or set FERRY_FTP_API_KEY")?;
        Ok(FtpSettings {
            host: self.host.clone().unwrap_or_else(|| cfg.host.clone()),
            port: self.port.unwrap_or(cfg.port),
            zone,
            api_key,
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }
}

/// S3-compatible object storage options. Unset values fall back to `[s3]`.
#[derive(Debug, Args)]
pub struct S3Args {
    #[arg(long = "s3-endpoint", value_name = "URL", global = true)]
    pub endpoint: Option<String>,

    #[arg(long = "s3-region", value_name = "REGION", global = true)]
    pub region: Option<String>,

    #[arg(long = "s3-bucket", env = "FERRY_S3_BUCKET", value_name = "BUCKET", global = true)]
    pub bucket: Option<String>,

    #[arg(
        long = "s3-access-key",
        env = "FERRY_S3_ACCESS_KEY",
        hide_env_values = true,
        value_name = "KEY",
        global = true
    )]
    pub access_key: Option<String>,

    #[arg(
        long = "s3-secret-key",
        env = "FERRY_S3_SECRET_KEY",
        hide_env_values = true,
        value_name = "KEY",
        global = true
    )]
    pub secret_key: Option<String>,
}

impl S3Args {
    fn settings(&self, cfg: &S3Config) -> Result<S3Settings> {
        let bucket = self
            .bucket
            .clone()
            .or_else(|| cfg.bucket.clone())
            .context("bucket missing: pass --s3-bucket or set FERRY_S3_BUCKET")?;
        let access_key = self
            .access_key
            .clone()
            .context("access key missing: pass --s3-access-key or set FERRY_S3_ACCESS_KEY")?;
        let secret_key = self
            .secret_key
            .clone()
            .context("secret key missing: pass --s3-secret-key or set FERRY_S3_SECRET_KEY")?;
        Ok(S3Settings {
            endpoint: self.endpoint.clone().unwrap_or_else(|| cfg.endpoint.clone()),
            region: self.region.clone().unwrap_or_else(|| cfg.region.clone()),
            bucket,
            access_key,
            secret_key,
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download every matching file under a remote directory.
    Download {
        /// Remote directory (storage zone path or key prefix).
        #[arg(long, value_name = "PATH")]
        remote_path: String,

        /// Local destination directory (created if missing).
        #[arg(long, value_name = "DIR")]
        local_path: PathBuf,

        /// File extensions to fetch, e.g. `.jpg .png` (default from config).
        #[arg(long, num_args = 1.., value_delimiter = ',', value_name = "EXT")]
        extensions: Vec<String>,

        /// Parallel transfers (default from config).
        #[arg(long, value_name = "N", value_parser = parse_workers)]
        max_workers: Option<usize>,
    },

    /// Upload a local directory tree, preserving relative paths.
    Upload {
        /// Local source directory.
        #[arg(long, value_name = "DIR")]
        local_path: PathBuf,

        /// Remote destination directory.
        #[arg(long, value_name = "PATH")]
        remote_path: String,

        /// Parallel transfers (default from config).
        #[arg(long, value_name = "N", value_parser = parse_workers)]
        max_workers: Option<usize>,
    },

    /// Connect, authenticate and list the first page of a remote path.
    Test {
        /// Remote path to list (root by default).
        #[arg(long, value_name = "PATH", default_value = "")]
        remote_path: String,
    },
}

fn parse_workers(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

impl Cli {
    /// Load config, build the selected backend and run the command.
    /// Returns the process exit code.
    pub async fn run(self) -> Result<i32> {
        let cfg = match &self.config {
            Some(path) => config::load_from(path)?,
            None => config::load_or_init()?,
        };
        tracing::debug!("loaded config: {:?}", cfg);
        let options = ClientOptions::from_config(&cfg)?;

        match self.backend {
            BackendKind::Ftp => {
                let backend = FtpBackend::new(self.ftp.settings(&cfg.ftp)?)?;
                dispatch(backend, options, &cfg, self.command).await
            }
            BackendKind::S3 => {
                let settings = self.s3.settings(&cfg.s3)?;
                let backend = S3Backend::new(settings, tokio::runtime::Handle::current())?;
                dispatch(backend, options, &cfg, self.command).await
            }
        }
    }
}

enum Finished {
    Run(ferry_core::client::RunReport),
    Code(i32),
}

async fn dispatch<B>(
    backend: B,
    options: ClientOptions,
    cfg: &FerryConfig,
    command: CliCommand,
) -> Result<i32>
where
    B: StorageBackend + 'static,
{
    let (tx, rx) = mpsc::channel();
    let client = Arc::new(TransferClient::new(backend, options).with_progress(tx));
    let printer = spawn_printer(rx);
    watch_ctrl_c(client.cancel_token().clone());

    let finished = match command {
        CliCommand::Download {
            remote_path,
            local_path,
            extensions,
            max_workers,
        } => {
            let extensions = if extensions.is_empty() {
                cfg.download.extensions.clone()
            } else {
                extensions
            };
            run_download(&client, remote_path, local_path, extensions, max_workers)
                .await
                .map(Finished::Run)
        }
        CliCommand::Upload {
            local_path,
            remote_path,
            max_workers,
        } => run_upload(&client, local_path, remote_path, max_workers)
            .await
            .map(Finished::Run),
        CliCommand::Test { remote_path } => run_test(&client, remote_path).await.map(Finished::Code),
    };

    let stats = on_engine(&client, |c| c.shutdown()).await?;
    tracing::debug!(created = stats.created, reused = stats.reused, "sessions closed");
    // The printer stops once the client's sender is gone.
    drop(client);
    let _ = printer.await;

    match finished? {
        Finished::Run(report) => {
            print_report(&report);
            Ok(report.exit_code())
        }
        Finished::Code(code) => Ok(code),
    }
}

#[cfg(test)]
mod tests;
