//! Hostkeep Configuration
//!
//! Layered configuration for one maintenance run:
//! 1. Built-in defaults
//! 2. Optional TOML file (/etc/hostkeep/config.toml or --config)
//! 3. HOSTKEEP_* environment variables
//!
//! A missing file is fine. A malformed file or an unparsable environment
//! value is a hard configuration error.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file location
pub const SYSTEM_CONFIG_FILE: &str = "/etc/hostkeep/config.toml";

/// Environment variables that survive privilege escalation
pub const ENV_KEYS: &[&str] = &[
    ENV_LOG_DIR,
    ENV_LOG_FILE,
    ENV_MIN_FREE_KB,
    ENV_JOURNAL_RETENTION,
    ENV_CONTAINER_MAINTENANCE,
    ENV_HELPER_REF,
    ENV_HELPER_OPTS,
    ENV_HELPER_POLICY,
    ENV_CACHE_DIR,
    ENV_KEEP_KERNELS,
    ENV_PROMPT_TIMEOUT,
];

pub const ENV_LOG_DIR: &str = "HOSTKEEP_LOG_DIR";
pub const ENV_LOG_FILE: &str = "HOSTKEEP_LOG_FILE";
pub const ENV_MIN_FREE_KB: &str = "HOSTKEEP_MIN_FREE_KB";
pub const ENV_JOURNAL_RETENTION: &str = "HOSTKEEP_JOURNAL_RETENTION";
pub const ENV_CONTAINER_MAINTENANCE: &str = "HOSTKEEP_CONTAINER_MAINTENANCE";
pub const ENV_HELPER_REF: &str = "HOSTKEEP_HELPER_REF";
pub const ENV_HELPER_OPTS: &str = "HOSTKEEP_HELPER_OPTS";
pub const ENV_HELPER_POLICY: &str = "HOSTKEEP_HELPER_POLICY";
pub const ENV_CACHE_DIR: &str = "HOSTKEEP_CACHE_DIR";
pub const ENV_KEEP_KERNELS: &str = "HOSTKEEP_KEEP_KERNELS";
pub const ENV_PROMPT_TIMEOUT: &str = "HOSTKEEP_PROMPT_TIMEOUT";

/// How the remote helper script is cached between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HelperPolicy {
    /// Fetch once per version reference, reuse on later runs
    #[default]
    Persistent,
    /// Fetch on every run and delete after use
    AlwaysFetch,
}

impl HelperPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            HelperPolicy::Persistent => "persistent",
            HelperPolicy::AlwaysFetch => "always-fetch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persistent" | "cache" => Some(HelperPolicy::Persistent),
            "always-fetch" | "always" | "fresh" => Some(HelperPolicy::AlwaysFetch),
            _ => None,
        }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostkeepConfig {
    /// Directory holding the run log
    pub log_dir: PathBuf,

    /// Explicit log file; defaults to `<log_dir>/hostkeep.log`
    pub log_file: Option<PathBuf>,

    /// Required free space on the root filesystem, in kilobytes
    pub min_free_kb: u64,

    /// Mount point checked for free space
    pub disk_mount: PathBuf,

    /// Retention period handed to `journalctl --vacuum-time`
    pub journal_retention: String,

    /// Whether container runtime maintenance runs at all
    pub container_maintenance: bool,

    /// Prune volumes as part of container maintenance
    pub prune_volumes: bool,

    /// Tools that must be present before anything runs
    pub required_tools: Vec<String>,

    /// Packages installed before the upgrade (tools later steps rely on)
    pub dependency_packages: Vec<String>,

    /// Remote helper URL; `{version}` is replaced by `helper_ref`
    pub helper_url_template: String,

    /// Version reference of the remote helper
    pub helper_ref: String,

    /// Options string passed to the helper, split on whitespace
    pub helper_opts: String,

    /// Helper caching policy
    pub helper_policy: HelperPolicy,

    /// Directory where the helper is staged
    pub cache_dir: PathBuf,

    /// Number of newest kernels kept besides the running one
    pub keep_kernels: usize,

    /// Vendor-supplied maintenance script, run when present
    pub vendor_script: PathBuf,

    /// Marker whose presence means a reboot is pending
    pub reboot_marker: PathBuf,

    /// PID lock file guarding against concurrent runs
    pub run_lock: PathBuf,

    /// Bounded wait for yes/no prompts, in seconds
    pub prompt_timeout_secs: u64,
}

impl Default for HostkeepConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("/var/log/hostkeep"),
            log_file: None,
            min_free_kb: 1024 * 1024,
            disk_mount: PathBuf::from("/"),
            journal_retention: "7d".to_string(),
            container_maintenance: true,
            prune_volumes: false,
            required_tools: vec![
                "apt-get".to_string(),
                "dpkg".to_string(),
                "uname".to_string(),
            ],
            dependency_packages: vec!["curl".to_string(), "ca-certificates".to_string()],
            helper_url_template:
                "https://raw.githubusercontent.com/hostkeep/docker-maintenance/{version}/docker-maintenance.sh"
                    .to_string(),
            helper_ref: "v1.2.0".to_string(),
            helper_opts: "--prune-dangling".to_string(),
            helper_policy: HelperPolicy::Persistent,
            cache_dir: PathBuf::from("/var/cache/hostkeep"),
            keep_kernels: 2,
            vendor_script: PathBuf::from("/usr/local/sbin/vendor-maintenance"),
            reboot_marker: PathBuf::from("/var/run/reboot-required"),
            run_lock: PathBuf::from("/run/hostkeep.lock"),
            prompt_timeout_secs: 30,
        }
    }
}

impl HostkeepConfig {
    /// Load defaults, then the config file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new(SYSTEM_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML file; unknown keys are ignored, missing keys default
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment values using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_LOG_DIR) {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_LOG_FILE) {
            self.log_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(ENV_MIN_FREE_KB) {
            self.min_free_kb = parse_number(ENV_MIN_FREE_KB, &v)?;
        }
        if let Some(v) = lookup(ENV_JOURNAL_RETENTION) {
            if v.trim().is_empty() {
                return Err(invalid(ENV_JOURNAL_RETENTION, &v, "must not be empty"));
            }
            self.journal_retention = v.trim().to_string();
        }
        if let Some(v) = lookup(ENV_CONTAINER_MAINTENANCE) {
            self.container_maintenance = parse_bool(ENV_CONTAINER_MAINTENANCE, &v)?;
        }
        if let Some(v) = lookup(ENV_HELPER_REF) {
            self.helper_ref = v.trim().to_string();
        }
        if let Some(v) = lookup(ENV_HELPER_OPTS) {
            self.helper_opts = v;
        }
        if let Some(v) = lookup(ENV_HELPER_POLICY) {
            self.helper_policy = HelperPolicy::parse(&v)
                .ok_or_else(|| invalid(ENV_HELPER_POLICY, &v, "expected persistent or always-fetch"))?;
        }
        if let Some(v) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_KEEP_KERNELS) {
            self.keep_kernels = parse_number::<usize>(ENV_KEEP_KERNELS, &v)?;
        }
        if let Some(v) = lookup(ENV_PROMPT_TIMEOUT) {
            self.prompt_timeout_secs = parse_number(ENV_PROMPT_TIMEOUT, &v)?;
        }
        Ok(())
    }

    /// Effective log file path
    pub fn log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.log_dir.join("hostkeep.log"))
    }

    /// Helper URL with the version reference substituted
    pub fn helper_url(&self) -> String {
        self.helper_url_template.replace("{version}", &self.helper_ref)
    }

    /// Helper arguments, split on whitespace
    pub fn helper_args(&self) -> Vec<String> {
        self.helper_opts.split_whitespace().map(str::to_string).collect()
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| invalid(key, value, "expected a non-negative integer"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}
