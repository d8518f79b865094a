//! Remote Helper Stager
//!
//! Fetches the container maintenance helper script, stages it in the cache
//! directory and hands back an executable path.
//!
//! Guarantees:
//! - Publishing is atomic: content goes to a temp file in the cache
//!   directory, is made executable, then renamed over the stable path.
//!   A reader sees the old script, the new script, or nothing.
//! - Under `HelperPolicy::Persistent` a script whose marker matches the
//!   requested URL and version, and whose checksum still matches, is reused
//!   without network access.
//! - Under `HelperPolicy::AlwaysFetch` every call fetches, and `release`
//!   deletes the staged files after use.

use crate::cleanup::CleanupRegistry;
use crate::config::HelperPolicy;
use crate::error::StagingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Stable file name of the staged helper
pub const HELPER_FILE_NAME: &str = "docker-maintenance.sh";

const FETCH_TIMEOUT_SECS: u64 = 60;

/// Source of helper script bytes
pub trait HelperFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

// ============================================================================
// Fetchers
// ============================================================================

/// HTTPS fetcher
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent(concat!("hostkeep/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl HelperFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| e.to_string())
    }
}

/// In-memory fetcher counting its calls
#[derive(Debug, Default)]
pub struct FakeFetcher {
    body: Mutex<Option<Vec<u8>>>,
    fetches: AtomicUsize,
}

impl FakeFetcher {
    pub fn serving(body: &str) -> Self {
        Self {
            body: Mutex::new(Some(body.as_bytes().to_vec())),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Every fetch fails, as if offline
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn set_body(&self, body: &str) {
        *self.body.lock().unwrap_or_else(|e| e.into_inner()) = Some(body.as_bytes().to_vec());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl HelperFetcher for FakeFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.body
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| format!("could not resolve host for {}", url))
    }
}

// ============================================================================
// Staging
// ============================================================================

/// Sidecar describing the staged script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperMarker {
    pub url: String,
    pub version_ref: String,
    pub fetched_at: DateTime<Utc>,
    pub sha256: String,
}

/// A staged, executable helper
#[derive(Debug, Clone)]
pub struct CachedHelper {
    pub path: PathBuf,
    pub marker: HelperMarker,
    /// True when served from cache without a fetch
    pub cache_hit: bool,
}

pub struct HelperStager<'a> {
    fetcher: &'a dyn HelperFetcher,
    cleanup: CleanupRegistry,
    policy: HelperPolicy,
}

impl<'a> HelperStager<'a> {
    pub fn new(fetcher: &'a dyn HelperFetcher, cleanup: CleanupRegistry, policy: HelperPolicy) -> Self {
        Self {
            fetcher,
            cleanup,
            policy,
        }
    }

    pub fn policy(&self) -> HelperPolicy {
        self.policy
    }

    /// Fetch-or-reuse the helper for `version_ref`
    pub fn stage(
        &self,
        url: &str,
        version_ref: &str,
        cache_dir: &Path,
    ) -> Result<CachedHelper, StagingError> {
        let script = script_path(cache_dir);

        if self.policy == HelperPolicy::Persistent {
            if let Some(marker) = valid_cache(cache_dir, url, version_ref) {
                info!("helper {} cached at {}", version_ref, script.display());
                return Ok(CachedHelper {
                    path: script,
                    marker,
                    cache_hit: true,
                });
            }
        }

        info!("fetching helper {} from {}", version_ref, url);
        let body = self
            .fetcher
            .fetch(url)
            .map_err(|reason| StagingError::FetchFailed {
                url: url.to_string(),
                reason,
            })?;
        if body.is_empty() {
            return Err(StagingError::FetchFailed {
                url: url.to_string(),
                reason: "empty response".to_string(),
            });
        }

        let marker = HelperMarker {
            url: url.to_string(),
            version_ref: version_ref.to_string(),
            fetched_at: Utc::now(),
            sha256: sha256_hex(&body),
        };

        fs::create_dir_all(cache_dir).map_err(|source| StagingError::Io {
            path: cache_dir.to_path_buf(),
            source,
        })?;
        self.publish(cache_dir, &script, &body, 0o755)?;
        let marker_json = serde_json::to_vec_pretty(&marker)
            .map_err(|e| io_err(&marker_path(cache_dir), io::Error::new(io::ErrorKind::InvalidData, e)))?;
        self.publish(cache_dir, &marker_path(cache_dir), &marker_json, 0o644)?;

        if !is_executable(&script) {
            return Err(StagingError::NotExecutable(script));
        }
        debug!("helper staged at {} (sha256 {})", script.display(), &marker.sha256[..12]);

        Ok(CachedHelper {
            path: script,
            marker,
            cache_hit: false,
        })
    }

    /// Apply the policy after the helper ran
    pub fn release(&self, helper: &CachedHelper) {
        if self.policy != HelperPolicy::AlwaysFetch {
            return;
        }
        let dir = helper.path.parent().map(Path::to_path_buf).unwrap_or_default();
        for path in [helper.path.clone(), marker_path(&dir)] {
            match fs::remove_file(&path) {
                Ok(()) => debug!("removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("could not remove {}: {}", path.display(), e),
            }
        }
    }

    /// temp file in the same directory, chmod, fsync, rename into place
    fn publish(&self, dir: &Path, dest: &Path, content: &[u8], mode: u32) -> Result<(), StagingError> {
        let mut temp = NamedTempFile::new_in(dir).map_err(|e| io_err(dir, e))?;
        let temp_path = temp.path().to_path_buf();
        self.cleanup.register(&temp_path);

        let result = (|| -> io::Result<()> {
            temp.write_all(content)?;
            temp.as_file().set_permissions(fs::Permissions::from_mode(mode))?;
            temp.as_file().sync_all()?;
            temp.persist(dest).map_err(|e| e.error)?;
            Ok(())
        })();

        self.cleanup.unregister(&temp_path);
        result.map_err(|e| io_err(dest, e))
    }
}

pub fn script_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(HELPER_FILE_NAME)
}

pub fn marker_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(format!("{}.ref", HELPER_FILE_NAME))
}

/// Marker of a cache entry usable for this url/version, if any
fn valid_cache(cache_dir: &Path, url: &str, version_ref: &str) -> Option<HelperMarker> {
    let script = script_path(cache_dir);
    let raw = fs::read(marker_path(cache_dir)).ok()?;
    let marker: HelperMarker = serde_json::from_slice(&raw).ok()?;
    if marker.version_ref != version_ref || marker.url != url {
        debug!("cached helper is {}, want {}", marker.version_ref, version_ref);
        return None;
    }
    if !is_executable(&script) {
        return None;
    }
    let content = fs::read(&script).ok()?;
    if sha256_hex(&content) != marker.sha256 {
        debug!("cached helper checksum mismatch");
        return None;
    }
    Some(marker)
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn io_err(path: &Path, source: io::Error) -> StagingError {
    StagingError::Io {
        path: path.to_path_buf(),
        source,
    }
}
