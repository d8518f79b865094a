//! Scoped cleanup
//!
//! Temporary files registered here are removed on every exit path: when
//! the guard drops (normal return or error) and from the signal handler
//! installed once at startup (SIGINT/SIGTERM).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Exit status after an interrupting signal
pub const EXIT_INTERRUPTED: i32 = 130;

/// Shared list of paths to remove on exit
#[derive(Debug, Clone, Default)]
pub struct CleanupRegistry {
    paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: &Path) {
        let mut paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_path_buf());
        }
    }

    /// Forget a path that was published or already removed
    pub fn unregister(&self, path: &Path) {
        self.paths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|p| p != path);
    }

    pub fn pending(&self) -> Vec<PathBuf> {
        self.paths.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Remove every registered path; returns how many were removed
    pub fn drain(&self) -> usize {
        let paths: Vec<PathBuf> = self
            .paths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        let mut removed = 0;
        for path in paths {
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => {
                    debug!("cleanup removed {}", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("cleanup could not remove {}: {}", path.display(), e),
            }
        }
        removed
    }

    /// Install the process-wide signal handler. Call once.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let registry = self.clone();
        ctrlc::set_handler(move || {
            let removed = registry.drain();
            eprintln!("\ninterrupted, removed {} temporary file(s)", removed);
            std::process::exit(EXIT_INTERRUPTED);
        })
    }

    /// Guard that drains the registry when dropped
    pub fn guard(&self) -> CleanupGuard {
        CleanupGuard {
            registry: self.clone(),
        }
    }
}

pub struct CleanupGuard {
    registry: CleanupRegistry,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.registry.drain();
    }
}
