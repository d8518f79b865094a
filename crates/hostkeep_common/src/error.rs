//! Error types shared across hostkeep components
//!
//! Each component owns one error enum. The step runner never lets any of
//! these escape a step: they are classified into outcomes instead.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Conditions that stop a run before any mutating step executes
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("hostkeep must run as root (effective uid {euid})")]
    InsufficientPrivilege { euid: u32 },

    #[error("missing required tools: {}", .0.join(", "))]
    MissingDependency(Vec<String>),

    #[error(
        "insufficient disk space on {mount}: {} available, {} required",
        format_kb(*available_kb),
        format_kb(*required_kb)
    )]
    InsufficientDiskSpace {
        mount: String,
        required_kb: u64,
        available_kb: u64,
    },

    #[error("could not determine free space on {mount}: {source}")]
    DiskQueryFailed {
        mount: String,
        #[source]
        source: io::Error,
    },

    #[error("another hostkeep run is in progress (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("run lock unavailable: {0}")]
    Lock(#[from] LockError),
}

/// Failures while staging the remote helper script
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("staging io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("staged helper at {0} is not executable")]
    NotExecutable(PathBuf),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Run lock errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock io error: {0}")]
    Io(#[from] io::Error),

    #[error("lock file corrupted: {0}")]
    Corrupted(String),
}

/// Render a kilobyte count the way humans read disk sizes ("300MB", "1GB")
pub fn format_kb(kb: u64) -> String {
    const MB: u64 = 1024;
    const GB: u64 = 1024 * 1024;
    if kb >= GB && kb % GB == 0 {
        format!("{}GB", kb / GB)
    } else if kb >= GB {
        format!("{:.1}GB", kb as f64 / GB as f64)
    } else if kb >= MB {
        format!("{}MB", kb / MB)
    } else {
        format!("{}KB", kb)
    }
}
