//! Privilege escalation
//!
//! One explicit check at entry, before config, logging or any step. A
//! non-root process replaces itself with `sudo <exe> --escalated <args>`,
//! carrying the HOSTKEEP_* variables and RUST_LOG across. A process that
//! already carries `--escalated` and still is not root gives up instead of
//! looping.

use anyhow::{Context, Result};
use hostkeep_common::config::ENV_KEYS;
use hostkeep_common::PreconditionError;
use nix::unistd::geteuid;
use std::env;
use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

pub const ESCALATED_FLAG: &str = "--escalated";

/// Outcome of the entry check
#[derive(Debug)]
pub enum Privilege {
    Root,
    /// Not root even after re-exec
    Denied(PreconditionError),
}

/// Return when root; otherwise re-exec under sudo (does not return on success)
pub fn ensure_root(already_escalated: bool) -> Result<Privilege> {
    let euid = geteuid();
    if euid.is_root() {
        return Ok(Privilege::Root);
    }
    if already_escalated {
        return Ok(Privilege::Denied(PreconditionError::InsufficientPrivilege {
            euid: euid.as_raw(),
        }));
    }

    let exe = env::current_exe().context("locating own executable")?;
    let err = sudo_command(&exe, env::args_os().skip(1)).exec();
    Err(err).context("re-executing under sudo")
}

/// Comma-separated list for `sudo --preserve-env=`
pub fn preserved_env() -> String {
    ENV_KEYS
        .iter()
        .copied()
        .chain(["RUST_LOG"])
        .collect::<Vec<_>>()
        .join(",")
}

pub fn sudo_command<I>(exe: &Path, args: I) -> Command
where
    I: IntoIterator<Item = OsString>,
{
    let mut cmd = Command::new("sudo");
    cmd.arg(format!("--preserve-env={}", preserved_env()))
        .arg("--")
        .arg(exe)
        .arg(ESCALATED_FLAG)
        .args(args.into_iter().filter(|a| a != ESCALATED_FLAG));
    cmd
}
