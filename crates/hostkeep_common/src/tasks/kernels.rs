//! Old kernel pruning
//!
//! Keeps the running kernel plus the newest `keep_kernels` installed
//! `linux-image-<version>` packages and purges the rest. Kernels newer than
//! the running one (installed but not booted yet) are never touched.

use super::apt::apt_get;
use crate::command_exec::CommandSpec;
use crate::runner::StepEnv;
use crate::steps::{StepFailure, StepResult};
use std::cmp::Ordering;

const IMAGE_PREFIX: &str = "linux-image-";

pub fn prune_old_kernels(env: &StepEnv<'_>) -> StepResult {
    let running = env
        .run(&CommandSpec::new("uname").arg("-r"))?
        .stdout
        .trim()
        .to_string();
    if running.is_empty() {
        return Err(StepFailure::new("could not determine running kernel"));
    }

    // dpkg-query exits 1 when nothing matches the pattern
    let listing = env.run(
        &CommandSpec::new("dpkg-query")
            .args([
                "-W",
                "-f=${Package} ${db:Status-Abbrev}\\n",
                "linux-image-[0-9]*",
            ])
            .benign_codes(&[1]),
    )?;
    let installed = installed_kernel_packages(&listing.stdout);
    let doomed = kernels_to_purge(&installed, &running, env.config.keep_kernels);

    if doomed.is_empty() {
        return Ok(format!(
            "nothing to prune ({} installed, running {})",
            installed.len(),
            running
        ));
    }

    env.run(&apt_get(["purge", "-y"]).args(doomed.iter().cloned()))?;
    Ok(format!("purged {} old kernel(s): {}", doomed.len(), doomed.join(", ")))
}

/// Fully installed (`ii`) kernel image packages from dpkg-query output
pub fn installed_kernel_packages(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let package = parts.next()?;
            let status = parts.next()?;
            (status.starts_with("ii") && package.starts_with(IMAGE_PREFIX))
                .then(|| package.to_string())
        })
        .collect()
}

/// Packages to purge, oldest first. Only kernels strictly older than the
/// running one qualify; the newest `keep` of those survive.
pub fn kernels_to_purge(installed: &[String], running: &str, keep: usize) -> Vec<String> {
    let running_version = upstream_version(running);

    let mut older: Vec<&String> = installed
        .iter()
        .filter(|p| {
            compare_versions(upstream_version(version_of(p)), running_version) == Ordering::Less
        })
        .collect();
    // newest first
    older.sort_by(|a, b| compare_packages(b, a));

    let mut doomed: Vec<String> = older.into_iter().skip(keep).cloned().collect();
    doomed.sort_by(|a, b| compare_packages(a, b));
    doomed
}

fn version_of(package: &str) -> &str {
    package.strip_prefix(IMAGE_PREFIX).unwrap_or(package)
}

/// Kernel release without its flavour: "6.1.0-18-amd64" -> "6.1.0-18",
/// "6.6.51+rpt-rpi-v8" -> "6.6.51"
pub fn upstream_version(release: &str) -> &str {
    let base = release.split('+').next().unwrap_or(release);
    let mut end = 0;
    for (i, segment) in base.split('-').enumerate() {
        if !segment.starts_with(|c: char| c.is_ascii_digit()) {
            break;
        }
        end += segment.len() + usize::from(i > 0);
    }
    &base[..end]
}

fn compare_packages(a: &str, b: &str) -> Ordering {
    compare_versions(upstream_version(version_of(a)), upstream_version(version_of(b)))
        .then_with(|| a.cmp(b))
}

/// Numeric-aware comparison: "6.1.0-18" > "6.1.0-9"
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let numbers = |s: &str| -> Vec<u64> {
        s.split(|c: char| !c.is_ascii_digit())
            .filter(|p| !p.is_empty())
            .filter_map(|p| p.parse().ok())
            .collect()
    };
    numbers(a).cmp(&numbers(b)).then_with(|| a.cmp(b))
}
