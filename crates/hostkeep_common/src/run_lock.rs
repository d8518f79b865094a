//! Run lock - at most one maintenance run per host
//!
//! A JSON lock file holding the owner's PID and start time. A lock whose
//! owner is gone, or which is older than the stale limit, is reclaimed.
//! Released on drop.

use crate::error::{LockError, PreconditionError};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, warn};

/// A maintenance run never legitimately holds the lock this long (6 hours)
const MAX_LOCK_AGE_SECS: i64 = 6 * 60 * 60;

/// Lock file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    /// Unix epoch seconds
    pub acquired_at: i64,
    pub hostname: String,
}

impl LockInfo {
    fn new(hostname: &str) -> Self {
        Self {
            pid: process::id(),
            acquired_at: chrono::Utc::now().timestamp(),
            hostname: hostname.to_string(),
        }
    }

    fn age_secs(&self) -> i64 {
        (chrono::Utc::now().timestamp() - self.acquired_at).max(0)
    }

    fn is_stale(&self) -> bool {
        self.age_secs() > MAX_LOCK_AGE_SECS
    }

    fn process_exists(&self) -> bool {
        Path::new(&format!("/proc/{}", self.pid)).exists()
    }
}

/// Held lock; dropping it removes the file
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path, hostname: &str) -> Result<Self, PreconditionError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(LockError::from)?;
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<LockInfo>(&content) {
                Ok(holder) if holder.pid == process::id() => {
                    debug!("run lock already held by this process");
                }
                Ok(holder) if holder.is_stale() => {
                    warn!("reclaiming stale run lock (pid {}, {}s old)", holder.pid, holder.age_secs());
                    remove_if_present(path)?;
                }
                Ok(holder) if !holder.process_exists() => {
                    warn!("reclaiming run lock of dead process {}", holder.pid);
                    remove_if_present(path)?;
                }
                Ok(holder) => return Err(PreconditionError::AlreadyRunning { pid: holder.pid }),
                Err(e) => {
                    warn!("reclaiming corrupted run lock: {}", e);
                    remove_if_present(path)?;
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(LockError::Io(e).into()),
        }

        let info = LockInfo::new(hostname);
        let content =
            serde_json::to_string_pretty(&info).map_err(|e| LockError::Corrupted(e.to_string()))?;

        // create_new closes the window between the read above and this write
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let pid = fs::read_to_string(path)
                    .ok()
                    .and_then(|c| serde_json::from_str::<LockInfo>(&c).ok())
                    .map(|h| h.pid)
                    .unwrap_or(0);
                if pid == process::id() {
                    return Ok(Self { path: path.to_path_buf() });
                }
                return Err(PreconditionError::AlreadyRunning { pid });
            }
            Err(e) => return Err(LockError::Io(e).into()),
        };
        file.write_all(content.as_bytes()).map_err(LockError::from)?;
        file.sync_all().map_err(LockError::from)?;

        debug!("run lock acquired at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_ours(&self) -> bool {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|c| serde_json::from_str::<LockInfo>(&c).ok())
            .map(|info| info.pid == process::id())
            .unwrap_or(false)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if self.is_ours() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("failed to release run lock: {}", e);
            } else {
                debug!("run lock released");
            }
        }
    }
}

fn remove_if_present(path: &Path) -> Result<(), LockError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
