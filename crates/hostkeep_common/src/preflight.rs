//! Precondition Gate
//!
//! Runs once, before any mutating step: privilege, required tools, free
//! disk space. Reads host state only. Any failure ends the run with
//! exit code 1 and no step executes.

use crate::config::HostkeepConfig;
use crate::error::{format_kb, PreconditionError};
use crate::host::HostProbe;
use tracing::{debug, info};

/// Administrative account uid
pub const ROOT_UID: u32 = 0;

pub struct Preflight<'a> {
    config: &'a HostkeepConfig,
    host: &'a dyn HostProbe,
}

impl<'a> Preflight<'a> {
    pub fn new(config: &'a HostkeepConfig, host: &'a dyn HostProbe) -> Self {
        Self { config, host }
    }

    /// Run every check in order; the first failing one is returned
    pub fn check(&self) -> Result<(), PreconditionError> {
        self.check_privilege()?;
        self.check_dependencies()?;
        self.check_disk_space()?;
        info!("preflight passed");
        Ok(())
    }

    pub fn check_privilege(&self) -> Result<(), PreconditionError> {
        let euid = self.host.effective_uid();
        if euid != ROOT_UID {
            return Err(PreconditionError::InsufficientPrivilege { euid });
        }
        debug!("running as root");
        Ok(())
    }

    /// Reports every missing tool, in configured order
    pub fn check_dependencies(&self) -> Result<(), PreconditionError> {
        let missing: Vec<String> = self
            .config
            .required_tools
            .iter()
            .filter(|t| !self.host.tool_present(t))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(PreconditionError::MissingDependency(missing));
        }
        debug!("required tools present: {}", self.config.required_tools.join(", "));
        Ok(())
    }

    pub fn check_disk_space(&self) -> Result<(), PreconditionError> {
        let mount = self.config.disk_mount.display().to_string();
        let available_kb = self
            .host
            .available_kb(&self.config.disk_mount)
            .map_err(|source| PreconditionError::DiskQueryFailed {
                mount: mount.clone(),
                source,
            })?;
        let required_kb = self.config.min_free_kb;

        if available_kb < required_kb {
            return Err(PreconditionError::InsufficientDiskSpace {
                mount,
                required_kb,
                available_kb,
            });
        }
        info!(
            "disk space ok on {}: {} available, {} required",
            mount,
            format_kb(available_kb),
            format_kb(required_kb)
        );
        Ok(())
    }
}
