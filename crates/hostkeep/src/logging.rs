//! Logging initialisation
//!
//! Console layer on stderr, quiet unless `-v` or `RUST_LOG` asks for more.
//! File layer appends plain text to the run log, including the tee'd
//! output of every command (target `hostkeep::exec`).

use anyhow::{Context, Result};
use hostkeep_common::HostkeepConfig;
use std::fs::{DirBuilder, File, OpenOptions};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LOG_DIR_MODE: u32 = 0o750;
const LOG_FILE_MODE: u32 = 0o640;

/// HTTP client crates are chatty at debug
const FILE_FILTER: &str = "debug,hyper=info,reqwest=info,rustls=info";

/// Create the log directory and open the log file for appending
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent() {
        DirBuilder::new()
            .recursive(true)
            .mode(LOG_DIR_MODE)
            .create(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(LOG_FILE_MODE)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

fn console_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "trace" } else { "warn" }))
}

/// Plain-text layer appending to the run log
pub fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(EnvFilter::new(FILE_FILTER))
}

/// Install the global subscriber; returns the log file path
pub fn init(config: &HostkeepConfig, verbose: bool) -> Result<PathBuf> {
    let path = config.log_file();
    let file = open_log_file(&path)?;

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter(verbose));

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer(file))
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(path)
}
