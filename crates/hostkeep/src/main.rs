//! hostkeep - unattended maintenance run for Debian-family hosts
//!
//! Order of a run:
//! 1. escalate to root (before anything is written)
//! 2. load configuration, open the log
//! 3. preflight and run lock
//! 4. the step plan
//! 5. summary, reboot check, exit code

mod cli;
mod errors;
mod escalate;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use errors::precondition_failed;
use escalate::Privilege;
use hostkeep_common::display;
use hostkeep_common::{
    standard_plan, AutoConfirm, CleanupRegistry, Confirm, Finalizer, HelperStager, HostProbe,
    HostkeepConfig, HttpFetcher, Preflight, RunContext, RunLock, StepRunner, SystemHost,
    SystemRunner, TerminalPrompt,
};
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            display::error(&format!("{:#}", e));
            errors::EXIT_PRECONDITION
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    if let Privilege::Denied(err) = escalate::ensure_root(cli.escalated)? {
        return Ok(precondition_failed(err, false));
    }

    let config = match HostkeepConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return Ok(precondition_failed(e, false)),
    };
    let log_path = logging::init(&config, cli.verbose)?;

    let cleanup = CleanupRegistry::new();
    cleanup
        .install_signal_handler()
        .context("installing signal handler")?;
    let _cleanup_guard = cleanup.guard();

    let host = SystemHost::new();
    let mut ctx = RunContext::new(config, host.hostname());
    info!(
        "hostkeep {} run {} on {} started at {}",
        VERSION,
        ctx.run_id,
        ctx.hostname,
        ctx.started_at.to_rfc3339()
    );
    display::heading(&format!("hostkeep {} on {}", VERSION, ctx.hostname));
    println!("Log: {}", log_path.display());

    if let Err(e) = Preflight::new(&ctx.config, &host).check() {
        return Ok(precondition_failed(e, true));
    }
    let lock = match RunLock::acquire(&ctx.config.run_lock, &ctx.hostname) {
        Ok(lock) => lock,
        Err(e) => return Ok(precondition_failed(e, true)),
    };
    // an interrupt exits without running destructors
    cleanup.register(lock.path());

    let prompt: Box<dyn Confirm> = if cli.yes {
        Box::new(AutoConfirm::yes())
    } else {
        Box::new(TerminalPrompt::new())
    };
    let exec = SystemRunner::new();
    let fetcher = HttpFetcher::new().context("building HTTP client")?;
    let stager = HelperStager::new(&fetcher, cleanup.clone(), ctx.config.helper_policy);

    let plan = standard_plan();
    let report = StepRunner::new(&exec, &host, prompt.as_ref(), &stager).run(&plan, &mut ctx);
    info!("{} of {} steps processed", report.processed, plan.len());

    let final_report = Finalizer::new(&exec, &host, prompt.as_ref()).finalize(&ctx);
    Ok(final_report.exit_code)
}
