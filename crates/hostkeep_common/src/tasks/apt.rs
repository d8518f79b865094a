//! Package manager steps (apt)
//!
//! All apt invocations run non-interactively with the C locale, which is
//! also what keeps `apt_summary` parseable.

use crate::command_exec::CommandSpec;
use crate::runner::StepEnv;
use crate::steps::StepResult;

/// apt-get with the environment every invocation needs
pub fn apt_get<I, S>(args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("apt-get")
        .env("DEBIAN_FRONTEND", "noninteractive")
        .env("LC_ALL", "C")
        .args(args)
}

/// Counts from apt's closing summary line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AptSummary {
    pub upgraded: u64,
    pub newly_installed: u64,
    pub to_remove: u64,
    pub not_upgraded: u64,
}

impl AptSummary {
    pub fn is_noop(&self) -> bool {
        self.upgraded == 0 && self.newly_installed == 0 && self.to_remove == 0
    }
}

/// Parse "N upgraded, M newly installed, R to remove and K not upgraded."
///
/// This is the only place apt's human output is interpreted, and only to
/// word outcome messages. Classification never depends on it.
pub fn apt_summary(stdout: &str) -> Option<AptSummary> {
    let line = stdout
        .lines()
        .find(|l| l.contains(" upgraded, ") && l.contains(" newly installed"))?;
    let numbers: Vec<u64> = line
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    match numbers.as_slice() {
        [upgraded, newly_installed, to_remove, not_upgraded, ..] => Some(AptSummary {
            upgraded: *upgraded,
            newly_installed: *newly_installed,
            to_remove: *to_remove,
            not_upgraded: *not_upgraded,
        }),
        _ => None,
    }
}

pub fn refresh_package_lists(env: &StepEnv<'_>) -> StepResult {
    env.run(&apt_get(["update"]))?;
    Ok("package lists refreshed".to_string())
}

pub fn install_dependencies(env: &StepEnv<'_>) -> StepResult {
    let packages = &env.config.dependency_packages;
    if packages.is_empty() {
        return Ok("no dependency packages configured".to_string());
    }
    let output = env.run(
        &apt_get(["install", "-y", "--no-install-recommends"]).args(packages.iter().cloned()),
    )?;
    Ok(match apt_summary(&output.stdout) {
        Some(s) if s.newly_installed > 0 || s.upgraded > 0 => format!(
            "{} installed, {} upgraded ({})",
            s.newly_installed,
            s.upgraded,
            packages.join(", ")
        ),
        _ => format!("already installed: {}", packages.join(", ")),
    })
}

pub fn full_upgrade(env: &StepEnv<'_>) -> StepResult {
    let output = env.run(&apt_get([
        "-y",
        "-o",
        "Dpkg::Options::=--force-confdef",
        "-o",
        "Dpkg::Options::=--force-confold",
        "full-upgrade",
    ]))?;
    Ok(match apt_summary(&output.stdout) {
        Some(s) if s.is_noop() => "system already up to date".to_string(),
        Some(s) => {
            let mut message = format!(
                "{} upgraded, {} newly installed, {} removed",
                s.upgraded, s.newly_installed, s.to_remove
            );
            if s.not_upgraded > 0 {
                message.push_str(&format!(", {} held back", s.not_upgraded));
            }
            message
        }
        None => "full upgrade completed".to_string(),
    })
}

pub fn cleanup(env: &StepEnv<'_>) -> StepResult {
    let removed = env.run(&apt_get(["-y", "autoremove", "--purge"]))?;
    env.run(&apt_get(["-y", "autoclean"]))?;
    env.run(&apt_get(["-y", "clean"]))?;
    let removed = apt_summary(&removed.stdout).map(|s| s.to_remove).unwrap_or(0);
    Ok(if removed == 0 {
        "nothing to autoremove; package cache cleaned".to_string()
    } else {
        format!("{} unused packages removed; package cache cleaned", removed)
    })
}

pub fn snap_refresh(env: &StepEnv<'_>) -> StepResult {
    let output = env.run(&CommandSpec::new("snap").arg("refresh"))?;
    let text = format!("{}{}", output.stdout, output.stderr);
    Ok(if text.contains("All snaps up to date") {
        "all snaps up to date".to_string()
    } else {
        "snaps refreshed".to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apt_summary_parses_counts() {
        let out = "Reading package lists...\nCalculating upgrade...\n12 upgraded, 2 newly installed, 1 to remove and 3 not upgraded.\nNeed to get 40 MB of archives.\n";
        assert_eq!(
            apt_summary(out),
            Some(AptSummary {
                upgraded: 12,
                newly_installed: 2,
                to_remove: 1,
                not_upgraded: 3,
            })
        );
    }

    #[test]
    fn test_apt_summary_noop() {
        let s = apt_summary("0 upgraded, 0 newly installed, 0 to remove and 0 not upgraded.\n").unwrap();
        assert!(s.is_noop());
    }

    #[test]
    fn test_apt_summary_absent() {
        assert_eq!(apt_summary("Hit:1 http://deb.debian.org bookworm InRelease\n"), None);
    }

    #[test]
    fn test_apt_get_sets_noninteractive_env() {
        let spec = apt_get(["update"]);
        assert!(spec
            .env
            .contains(&("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())));
        assert_eq!(spec.command_line(), "apt-get update");
    }
}
