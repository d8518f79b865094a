//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from the run itself.

use clap::Parser;
use std::path::PathBuf;

/// Unattended maintenance for Debian-family hosts
#[derive(Parser, Debug)]
#[command(name = "hostkeep")]
#[command(about = "hostkeep - host maintenance run", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Trace-level diagnostics on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Answer yes to every prompt (firmware updates, reboot)
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Configuration file (default /etc/hostkeep/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Set by the privilege re-exec (hidden)
    #[arg(long, hide = true)]
    pub escalated: bool,
}
