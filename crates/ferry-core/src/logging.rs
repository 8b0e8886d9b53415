//! Logging init: append to a file under the XDG state dir, falling back to
//! stderr when the file cannot be opened.

use anyhow::Result;
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Filter used for the log file when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,ferry=debug";

/// Where log lines end up after `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
}

/// Hands each event a clone of the log file handle; stderr if cloning fails.
struct SharedFile(File);

enum FileOrStderr {
    File(File),
    Stderr(io::Stderr),
}

impl io::Write for FileOrStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileOrStderr::File(f) => f.write(buf),
            FileOrStderr::Stderr(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileOrStderr::File(f) => f.flush(),
            FileOrStderr::Stderr(e) => e.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for SharedFile {
    type Writer = FileOrStderr;

    fn make_writer(&'a self) -> Self::Writer {
        match self.0.try_clone() {
            Ok(f) => FileOrStderr::File(f),
            Err(_) => FileOrStderr::Stderr(io::stderr()),
        }
    }
}

/// `~/.local/state/ferry/ferry.log`
pub fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ferry")?;
    Ok(xdg_dirs.get_state_home().join("ferry").join("ferry.log"))
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Filter for the stderr fallback, where log lines share the terminal with
/// progress output.
fn stderr_default(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}

/// Initialize structured logging to the state-dir log file.
/// Returns Err (without installing anything) when the file cannot be opened.
pub fn init_logging() -> Result<PathBuf> {
    let path = log_file_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(DEFAULT_FILTER))
        .with_writer(SharedFile(file))
        .with_ansi(false)
        .init();

    tracing::info!("ferry logging initialized at {}", path.display());
    Ok(path)
}

/// Initialize logging to stderr only.
pub fn init_logging_stderr(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(stderr_default(verbose)))
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

/// File logging when possible, stderr otherwise. `verbose` only affects the
/// stderr fallback.
pub fn init(verbose: bool) -> LogTarget {
    match init_logging() {
        Ok(path) => LogTarget::File(path),
        Err(e) => {
            init_logging_stderr(verbose);
            tracing::warn!("file logging unavailable ({e:#}), logging to stderr");
            LogTarget::Stderr
        }
    }
}
