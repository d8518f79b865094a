//! Host probe - read-only view of the machine being maintained
//!
//! Everything the orchestrator needs to know about the host goes through
//! `HostProbe`, so preconditions and eligibility can be tested without
//! root, a Raspberry Pi, or a nearly full disk.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Device-tree model files, first readable one wins
const MODEL_PATHS: &[&str] = &[
    "/proc/device-tree/model",
    "/sys/firmware/devicetree/base/model",
];

/// Read-only host state
pub trait HostProbe {
    /// Effective user id of this process
    fn effective_uid(&self) -> u32;

    /// Whether an executable with this name is on PATH
    fn tool_present(&self, name: &str) -> bool;

    /// Kilobytes available to unprivileged writers on the filesystem at `mount`
    fn available_kb(&self, mount: &Path) -> io::Result<u64>;

    /// Board/model string, when the platform exposes one
    fn hardware_model(&self) -> Option<String>;

    fn path_exists(&self, path: &Path) -> bool;

    /// Contents of a small host-owned text file (markers, package lists)
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn hostname(&self) -> String;
}

// ============================================================================
// System host (production)
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }
}

impl HostProbe for SystemHost {
    fn effective_uid(&self) -> u32 {
        nix::unistd::geteuid().as_raw()
    }

    fn tool_present(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }

    fn available_kb(&self, mount: &Path) -> io::Result<u64> {
        let stat = nix::sys::statvfs::statvfs(mount).map_err(io::Error::from)?;
        let bytes = (stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64);
        Ok(bytes / 1024)
    }

    fn hardware_model(&self) -> Option<String> {
        MODEL_PATHS
            .iter()
            .filter_map(|p| fs::read(p).ok())
            .map(|raw| parse_model(&raw))
            .find(|m| !m.is_empty())
            .or_else(|| {
                fs::read_to_string("/proc/cpuinfo")
                    .ok()
                    .and_then(|c| model_from_cpuinfo(&c))
            })
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn hostname(&self) -> String {
        sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
    }
}

/// Device-tree strings are NUL-terminated
fn parse_model(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

fn model_from_cpuinfo(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim() == "Model")
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Fake host (tests)
// ============================================================================

/// Scriptable host; defaults to a root shell on a generic x86 box with
/// plenty of disk and no tools
#[derive(Debug, Clone)]
pub struct FakeHost {
    pub euid: u32,
    pub tools: HashSet<String>,
    pub available_kb: Option<u64>,
    pub model: Option<String>,
    pub paths: HashSet<PathBuf>,
    pub files: HashMap<PathBuf, String>,
    pub hostname: String,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            euid: 0,
            tools: HashSet::new(),
            available_kb: Some(50 * 1024 * 1024),
            model: None,
            paths: HashSet::new(),
            files: HashMap::new(),
            hostname: "testhost".to_string(),
        }
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools.extend(tools.iter().map(|t| t.to_string()));
        self
    }

    pub fn without_tool(mut self, tool: &str) -> Self {
        self.tools.remove(tool);
        self
    }

    pub fn with_euid(mut self, euid: u32) -> Self {
        self.euid = euid;
        self
    }

    pub fn with_available_kb(mut self, kb: u64) -> Self {
        self.available_kb = Some(kb);
        self
    }

    /// Make the disk query fail
    pub fn with_broken_disk(mut self) -> Self {
        self.available_kb = None;
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(path.into());
        self
    }

    /// An existing file with the given contents
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: &str) -> Self {
        let path = path.into();
        self.paths.insert(path.clone());
        self.files.insert(path, contents.to_string());
        self
    }
}

impl HostProbe for FakeHost {
    fn effective_uid(&self) -> u32 {
        self.euid
    }

    fn tool_present(&self, name: &str) -> bool {
        self.tools.contains(name)
    }

    fn available_kb(&self, mount: &Path) -> io::Result<u64> {
        self.available_kb.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("statvfs {} failed", mount.display()),
            )
        })
    }

    fn hardware_model(&self) -> Option<String> {
        self.model.clone()
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }
}
