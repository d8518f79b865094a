//! Summary & Exit Reporter
//!
//! Runs once at the end of every run that got past preflight, whether the
//! step runner finished or halted on a hard failure. Renders the outcome
//! list in execution order, decides the exit status, and offers a reboot
//! when the host says one is pending.

use crate::command_exec::{CommandRunner, CommandSpec};
use crate::display;
use crate::host::HostProbe;
use crate::prompt::Confirm;
use crate::runner::RunContext;
use crate::steps::StepStatus;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// All eligible steps succeeded or were benignly skipped
pub const EXIT_SUCCESS: i32 = 0;
/// Privilege, dependency, disk, lock or configuration failure
pub const EXIT_PRECONDITION: i32 = 1;
/// A step marked abort-on-failure failed
pub const EXIT_HARD_FAILURE: i32 = 2;

/// What happened at the reboot check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootDecision {
    NotRequired,
    Declined,
    Requested,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalReport {
    pub exit_code: i32,
    pub reboot: RebootDecision,
}

/// Exit status for a finished run; soft failures never make it nonzero
pub fn exit_code(ctx: &RunContext) -> i32 {
    if ctx.hard_failure().is_some() {
        EXIT_HARD_FAILURE
    } else {
        EXIT_SUCCESS
    }
}

/// Itemized summary, one line per outcome, in execution order
pub fn render_summary(ctx: &RunContext) -> Vec<String> {
    let mut lines: Vec<String> = ctx
        .outcomes()
        .iter()
        .map(|o| {
            format!(
                "{:>2}. {}",
                o.position,
                display::status_line(o.status, &o.step, &o.message)
            )
        })
        .collect();

    lines.push(format!(
        "{} succeeded, {} skipped, {} soft-failed, {} hard-failed",
        ctx.count(StepStatus::Succeeded),
        ctx.count(StepStatus::Skipped),
        ctx.count(StepStatus::SoftFailed),
        ctx.count(StepStatus::HardFailed),
    ));
    if let Some(failed) = ctx.hard_failure() {
        lines.push(format!("run halted by {}", failed.step));
    }
    lines
}

pub struct Finalizer<'a> {
    exec: &'a dyn CommandRunner,
    host: &'a dyn HostProbe,
    prompt: &'a dyn Confirm,
}

impl<'a> Finalizer<'a> {
    pub fn new(exec: &'a dyn CommandRunner, host: &'a dyn HostProbe, prompt: &'a dyn Confirm) -> Self {
        Self { exec, host, prompt }
    }

    pub fn finalize(&self, ctx: &RunContext) -> FinalReport {
        let elapsed = Utc::now().signed_duration_since(ctx.started_at);
        display::heading(&format!(
            "Maintenance summary for {} ({}s)",
            ctx.hostname,
            elapsed.num_seconds()
        ));
        for line in render_summary(ctx) {
            println!("{}", line);
        }
        for outcome in ctx.outcomes() {
            info!(
                "summary {:>2} {:<22} {:<11} {}",
                outcome.position,
                outcome.step,
                outcome.status.as_str(),
                outcome.message
            );
        }

        let exit_code = exit_code(ctx);
        match ctx.hard_failure() {
            Some(failed) => error!("run {} finished with hard failure in {}", ctx.run_id, failed.step),
            None => info!("run {} finished", ctx.run_id),
        }

        let reboot = self.reboot_check(ctx);
        FinalReport { exit_code, reboot }
    }

    fn reboot_check(&self, ctx: &RunContext) -> RebootDecision {
        let marker = &ctx.config.reboot_marker;
        if !self.host.path_exists(marker) {
            info!("no reboot required");
            return RebootDecision::NotRequired;
        }

        let packages = pending_reboot_packages(self.host, marker);
        let question = if packages.is_empty() {
            "A reboot is required. Reboot now?".to_string()
        } else {
            format!(
                "A reboot is required by: {}. Reboot now?",
                packages.join(", ")
            )
        };
        warn!("reboot required (marker {})", marker.display());

        if !self.prompt.confirm(&question, ctx.config.prompt_timeout()) {
            println!("Reboot postponed. Remember to reboot {} soon.", ctx.hostname);
            return RebootDecision::Declined;
        }

        let spec = CommandSpec::new("systemctl").arg("reboot");
        match self.exec.run(&spec) {
            Ok(out) if out.succeeded(&spec) => {
                info!("reboot requested");
                RebootDecision::Requested
            }
            Ok(out) => {
                let reason = format!("`{}` failed ({})", spec, out.describe_exit());
                error!("{}", reason);
                RebootDecision::Failed(reason)
            }
            Err(e) => {
                let reason = format!("cannot start `{}`: {}", spec, e);
                error!("{}", reason);
                RebootDecision::Failed(reason)
            }
        }
    }
}

/// Packages listed next to the marker (Debian writes `<marker>.pkgs`)
pub fn pending_reboot_packages(host: &dyn HostProbe, marker: &Path) -> Vec<String> {
    let mut pkgs_path = PathBuf::from(marker);
    pkgs_path.set_extension("pkgs");
    let mut packages: Vec<String> = host
        .read_to_string(&pkgs_path)
        .map(|c| {
            c.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    packages.sort();
    packages.dedup();
    packages
}
