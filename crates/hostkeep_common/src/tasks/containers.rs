//! Container runtime maintenance
//!
//! Stage the remote helper (fetch-or-reuse), run it, then prune unused
//! containers, networks, images and optionally volumes. The helper is
//! optional: when it cannot be staged or fails, pruning still happens and
//! the step reports a soft failure.

use crate::command_exec::CommandSpec;
use crate::features::{requires_tool, Eligibility};
use crate::runner::StepEnv;
use crate::steps::{StepFailure, StepResult};
use tracing::warn;

pub const RUNTIME: &str = "docker";

pub fn eligibility(env: &StepEnv<'_>) -> Eligibility {
    Eligibility::when(env.config.container_maintenance, "container maintenance disabled")
        .and(|| requires_tool(env.host, RUNTIME, "runtime"))
}

pub fn prune_commands(prune_volumes: bool) -> Vec<(&'static str, CommandSpec)> {
    let mut commands = vec![
        ("containers", docker(["container", "prune", "-f"])),
        ("networks", docker(["network", "prune", "-f"])),
        ("images", docker(["image", "prune", "-a", "-f"])),
    ];
    if prune_volumes {
        commands.push(("volumes", docker(["volume", "prune", "-f"])));
    }
    commands
}

fn docker<const N: usize>(args: [&str; N]) -> CommandSpec {
    CommandSpec::new(RUNTIME).args(args)
}

pub fn maintain_containers(env: &StepEnv<'_>) -> StepResult {
    let config = env.config;

    env.run(&docker(["info", "--format", "{{.ServerVersion}}"]))
        .map_err(|f| StepFailure::new(format!("runtime not responding: {}", f)))?;

    let mut notes = Vec::new();
    let mut problems = Vec::new();

    match env
        .stager
        .stage(&config.helper_url(), &config.helper_ref, &config.cache_dir)
    {
        Ok(helper) => {
            let spec = CommandSpec::new(helper.path.display().to_string()).args(config.helper_args());
            match env.run(&spec) {
                Ok(_) => notes.push(format!(
                    "helper {} ran ({})",
                    config.helper_ref,
                    if helper.cache_hit { "cached" } else { "fetched" }
                )),
                Err(f) => problems.push(format!("helper failed: {}", f)),
            }
            env.stager.release(&helper);
        }
        Err(e) => {
            warn!("skipping container helper: {}", e);
            problems.push(format!("helper unavailable: {}", e));
        }
    }

    let mut pruned = Vec::new();
    for (what, spec) in prune_commands(config.prune_volumes) {
        match env.run(&spec) {
            Ok(output) => match reclaimed_space(&output.stdout) {
                Some(space) if space != "0B" => pruned.push(format!("{} ({})", what, space)),
                _ => pruned.push(what.to_string()),
            },
            Err(f) => problems.push(f.message),
        }
    }
    if !pruned.is_empty() {
        notes.push(format!("pruned {}", pruned.join(", ")));
    }

    if problems.is_empty() {
        Ok(notes.join("; "))
    } else {
        notes.extend(problems);
        Err(StepFailure::new(notes.join("; ")))
    }
}

/// Value of docker's "Total reclaimed space: 1.2GB" line
pub fn reclaimed_space(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("Total reclaimed space:"))
        .map(|v| v.trim().to_string())
}
