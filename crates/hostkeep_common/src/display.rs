//! Terminal progress lines
//!
//! Severity-tagged, colored when the terminal supports it. These go to
//! stdout for the operator; the log file gets its own records via tracing.

use crate::steps::StepStatus;
use owo_colors::OwoColorize;

/// Tag printed in front of a status line
pub fn status_tag(status: StepStatus) -> String {
    let plain = match status {
        StepStatus::Succeeded => "[ OK ]",
        StepStatus::Skipped => "[SKIP]",
        StepStatus::SoftFailed => "[WARN]",
        StepStatus::HardFailed => "[FAIL]",
    };
    if !console::colors_enabled() {
        return plain.to_string();
    }
    match status {
        StepStatus::Succeeded => plain.green().bold().to_string(),
        StepStatus::Skipped => plain.dimmed().to_string(),
        StepStatus::SoftFailed => plain.yellow().bold().to_string(),
        StepStatus::HardFailed => plain.red().bold().to_string(),
    }
}

pub fn status_line(status: StepStatus, name: &str, message: &str) -> String {
    format!("{} {}: {}", status_tag(status), name, message)
}

/// "==> [3/11] Full system upgrade"
pub fn banner(position: usize, total: usize, title: &str) {
    let counter = format!("[{}/{}]", position, total);
    if console::colors_enabled() {
        println!("{} {} {}", "==>".cyan().bold(), counter.dimmed(), title.bold());
    } else {
        println!("==> {} {}", counter, title);
    }
}

pub fn print_status(status: StepStatus, name: &str, message: &str) {
    println!("{}", status_line(status, name, message));
}

pub fn error(message: &str) {
    if console::colors_enabled() {
        eprintln!("{} {}", "error:".red().bold(), message);
    } else {
        eprintln!("error: {}", message);
    }
}

pub fn heading(text: &str) {
    if console::colors_enabled() {
        println!("\n{}", text.bold().underline());
    } else {
        println!("\n{}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_status_line() {
        console::set_colors_enabled(false);
        assert_eq!(
            status_line(StepStatus::SoftFailed, "kernel-prune", "purge failed"),
            "[WARN] kernel-prune: purge failed"
        );
        assert_eq!(status_tag(StepStatus::HardFailed), "[FAIL]");
    }
}
