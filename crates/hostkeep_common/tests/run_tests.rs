//! End-to-end runs of the standard plan against scripted fakes.
//!
//! Tests verify:
//! - Outcomes are recorded in plan order and a hard failure halts the run
//! - Ineligible steps are skipped without prompting or running anything
//! - Exit codes follow the outcome set
//! - The reboot check runs whether or not the run halted
//! - The reboot question names the packages that asked for it

use hostkeep_common::cleanup::CleanupRegistry;
use hostkeep_common::command_exec::{FakeResponse, FakeRunner};
use hostkeep_common::helper_stager::{FakeFetcher, HelperStager};
use hostkeep_common::host::{FakeHost, HostProbe};
use hostkeep_common::preflight::Preflight;
use hostkeep_common::prompt::AutoConfirm;
use hostkeep_common::report::{FinalReport, Finalizer, RebootDecision};
use hostkeep_common::runner::{RunContext, RunReport, StepRunner};
use hostkeep_common::{
    standard_plan, HostkeepConfig, PreconditionError, StepStatus, EXIT_HARD_FAILURE, EXIT_SUCCESS,
};
use tempfile::TempDir;

const RUNNING_KERNEL: &str = "6.1.0-20-amd64";
const UPGRADE_PREFIX: &str = "apt-get -y -o Dpkg::Options::=--force-confdef";

/// Debian host with the usual tools, no container runtime, no Pi
fn debian_host() -> FakeHost {
    FakeHost::new().with_tools(&["apt-get", "dpkg", "dpkg-query", "uname", "journalctl"])
}

fn quiet_runner() -> FakeRunner {
    FakeRunner::new().respond("uname -r", FakeResponse::ok(&format!("{}\n", RUNNING_KERNEL)))
}

fn test_config(temp: &TempDir) -> HostkeepConfig {
    HostkeepConfig {
        log_dir: temp.path().join("log"),
        cache_dir: temp.path().join("cache"),
        vendor_script: temp.path().join("vendor-maintenance"),
        reboot_marker: temp.path().join("reboot-required"),
        run_lock: temp.path().join("hostkeep.lock"),
        ..HostkeepConfig::default()
    }
}

struct Run {
    ctx: RunContext,
    report: RunReport,
    final_report: FinalReport,
}

fn run_plan(
    config: &HostkeepConfig,
    host: &FakeHost,
    exec: &FakeRunner,
    fetcher: &FakeFetcher,
    prompt: &AutoConfirm,
) -> Run {
    let stager = HelperStager::new(fetcher, CleanupRegistry::new(), config.helper_policy);
    let mut ctx = RunContext::new(config.clone(), host.hostname());
    let report = StepRunner::new(exec, host, prompt, &stager).run(&standard_plan(), &mut ctx);
    let final_report = Finalizer::new(exec, host, prompt).finalize(&ctx);
    Run {
        ctx,
        report,
        final_report,
    }
}

fn status_of(ctx: &RunContext, step: &str) -> StepStatus {
    ctx.outcomes()
        .iter()
        .find(|o| o.step == step)
        .map(|o| o.status)
        .unwrap_or_else(|| panic!("no outcome for {}", step))
}

fn message_of<'a>(ctx: &'a RunContext, step: &str) -> &'a str {
    ctx.outcomes()
        .iter()
        .find(|o| o.step == step)
        .map(|o| o.message.as_str())
        .unwrap_or_else(|| panic!("no outcome for {}", step))
}

#[test]
fn test_runtime_absent_skips_container_step() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let host = debian_host();
    let exec = quiet_runner();
    let fetcher = FakeFetcher::serving("#!/bin/sh\nexit 0\n");

    let run = run_plan(&config, &host, &exec, &fetcher, &AutoConfirm::no());

    assert_eq!(run.ctx.outcomes().len(), standard_plan().len());
    assert_eq!(status_of(&run.ctx, "container-maintenance"), StepStatus::Skipped);
    assert_eq!(message_of(&run.ctx, "container-maintenance"), "runtime not installed");
    assert!(run.ctx.outcomes().iter().all(|o| !o.status.is_failure()));
    for step in ["package-lists", "install-dependencies", "full-upgrade", "cleanup", "kernel-prune", "journal-vacuum"] {
        assert_eq!(status_of(&run.ctx, step), StepStatus::Succeeded, "{}", step);
    }
    assert_eq!(exec.count("docker"), 0);
    assert_eq!(fetcher.fetch_count(), 0);
    assert_eq!(run.final_report.exit_code, EXIT_SUCCESS);
}

#[test]
fn test_upgrade_failure_halts_run() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let host = debian_host().with_tools(&["docker"]);
    let exec = quiet_runner().respond(
        UPGRADE_PREFIX,
        FakeResponse::exit(100, "E: Sub-process /usr/bin/dpkg returned an error code (1)"),
    );
    let fetcher = FakeFetcher::serving("#!/bin/sh\nexit 0\n");

    let run = run_plan(&config, &host, &exec, &fetcher, &AutoConfirm::yes());

    let statuses: Vec<StepStatus> = run.ctx.outcomes().iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Succeeded, StepStatus::Succeeded, StepStatus::HardFailed]
    );
    assert_eq!(run.ctx.count(StepStatus::HardFailed), 1);
    assert_eq!(run.report.halted_by.as_deref(), Some("full-upgrade"));
    assert!(message_of(&run.ctx, "full-upgrade").contains("exit 100"));
    assert_eq!(exec.count("apt-get -y autoremove"), 0);
    assert_eq!(exec.count("docker"), 0);
    assert_eq!(run.final_report.exit_code, EXIT_HARD_FAILURE);
}

#[test]
fn test_soft_failure_keeps_exit_zero() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let host = debian_host();
    let exec = quiet_runner().respond("journalctl --vacuum-time", FakeResponse::exit(1, "Failed to vacuum"));
    let fetcher = FakeFetcher::offline();

    let run = run_plan(&config, &host, &exec, &fetcher, &AutoConfirm::no());

    assert_eq!(status_of(&run.ctx, "journal-vacuum"), StepStatus::SoftFailed);
    assert_eq!(run.ctx.outcomes().len(), standard_plan().len());
    assert_eq!(run.final_report.exit_code, EXIT_SUCCESS);
}

#[test]
fn test_second_run_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let host = debian_host().with_tools(&["docker"]);
    let exec = quiet_runner();
    let fetcher = FakeFetcher::serving("#!/bin/sh\nexit 0\n");

    let first = run_plan(&config, &host, &exec, &fetcher, &AutoConfirm::no());
    let second = run_plan(&config, &host, &exec, &fetcher, &AutoConfirm::no());

    for run in [&first, &second] {
        assert!(run.ctx.outcomes().iter().all(|o| !o.status.is_failure()));
        assert_eq!(run.final_report.exit_code, EXIT_SUCCESS);
    }
    let statuses = |run: &Run| -> Vec<StepStatus> { run.ctx.outcomes().iter().map(|o| o.status).collect() };
    assert_eq!(statuses(&first), statuses(&second));
    assert_ne!(first.ctx.run_id, second.ctx.run_id);
}

#[test]
fn test_non_target_hardware_skips_firmware_without_prompting() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let host = debian_host()
        .with_tools(&["rpi-eeprom-update"])
        .with_model("QEMU Standard PC (Q35 + ICH9, 2009)");
    let exec = quiet_runner();
    let prompt = AutoConfirm::yes();

    let run = run_plan(&config, &host, &exec, &FakeFetcher::offline(), &prompt);

    assert_eq!(status_of(&run.ctx, "eeprom-update"), StepStatus::Skipped);
    assert_eq!(message_of(&run.ctx, "eeprom-update"), "not Raspberry Pi hardware");
    assert_eq!(status_of(&run.ctx, "fwupd-update"), StepStatus::Skipped);
    assert_eq!(message_of(&run.ctx, "fwupd-update"), "fwupdmgr not installed");
    assert!(prompt.asked().is_empty());
    assert_eq!(exec.count("rpi-eeprom-update"), 0);
}

#[test]
fn test_pi_eeprom_update_after_confirmation() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let host = debian_host()
        .with_tools(&["rpi-eeprom-update"])
        .with_model("Raspberry Pi 4 Model B Rev 1.4");
    let exec = quiet_runner().respond(
        "rpi-eeprom-update -a",
        FakeResponse::ok("EEPROM updates pending. Please reboot to apply the update.\n"),
    );
    let prompt = AutoConfirm::scripted(&[true], false);

    let run = run_plan(&config, &host, &exec, &FakeFetcher::offline(), &prompt);

    assert_eq!(status_of(&run.ctx, "eeprom-update"), StepStatus::Succeeded);
    assert!(message_of(&run.ctx, "eeprom-update").contains("next reboot"));
    assert_eq!(prompt.asked().len(), 1);
    assert_eq!(exec.count("rpi-eeprom-update -a"), 1);
}

#[test]
fn test_helper_fetch_failure_still_prunes() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let host = debian_host().with_tools(&["docker"]);
    let exec = quiet_runner();

    let run = run_plan(&config, &host, &exec, &FakeFetcher::offline(), &AutoConfirm::no());

    assert_eq!(status_of(&run.ctx, "container-maintenance"), StepStatus::SoftFailed);
    assert!(message_of(&run.ctx, "container-maintenance").contains("helper unavailable"));
    assert_eq!(exec.count("docker container prune -f"), 1);
    assert_eq!(exec.count("docker image prune -a -f"), 1);
    assert_eq!(run.final_report.exit_code, EXIT_SUCCESS);
}

#[test]
fn test_container_toggle_off() {
    let temp = TempDir::new().unwrap();
    let config = HostkeepConfig {
        container_maintenance: false,
        ..test_config(&temp)
    };
    let host = debian_host().with_tools(&["docker"]);
    let exec = quiet_runner();

    let run = run_plan(&config, &host, &exec, &FakeFetcher::offline(), &AutoConfirm::no());

    assert_eq!(
        message_of(&run.ctx, "container-maintenance"),
        "container maintenance disabled"
    );
    assert_eq!(exec.count("docker"), 0);
}

#[test]
fn test_vendor_script_runs_when_present() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let host = debian_host().with_path(config.vendor_script.clone());
    let exec = quiet_runner();

    let run = run_plan(&config, &host, &exec, &FakeFetcher::offline(), &AutoConfirm::no());

    let script = config.vendor_script.display().to_string();
    assert_eq!(status_of(&run.ctx, "vendor-script"), StepStatus::Succeeded);
    assert_eq!(exec.count(&format!("chmod +x {}", script)), 1);
    assert!(exec.calls().contains(&script));
}

#[test]
fn test_reboot_prompt_after_hard_failure() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let host = debian_host().with_path(config.reboot_marker.clone());
    let exec = quiet_runner().respond("apt-get update", FakeResponse::exit(100, "E: network unreachable"));
    let prompt = AutoConfirm::scripted(&[true], false);

    let run = run_plan(&config, &host, &exec, &FakeFetcher::offline(), &prompt);

    assert_eq!(run.ctx.outcomes().len(), 1);
    assert_eq!(run.final_report.exit_code, EXIT_HARD_FAILURE);
    assert_eq!(run.final_report.reboot, RebootDecision::Requested);
    assert_eq!(exec.count("systemctl reboot"), 1);
}

#[test]
fn test_reboot_declined_by_default() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let host = debian_host().with_path(config.reboot_marker.clone());
    let exec = quiet_runner();
    let prompt = AutoConfirm::no();

    let run = run_plan(&config, &host, &exec, &FakeFetcher::offline(), &prompt);

    assert_eq!(run.final_report.reboot, RebootDecision::Declined);
    assert_eq!(prompt.asked().len(), 1);
    assert_eq!(exec.count("systemctl"), 0);
}

#[test]
fn test_reboot_question_lists_pending_packages() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let host = debian_host()
        .with_path(config.reboot_marker.clone())
        .with_file(
            temp.path().join("reboot-required.pkgs"),
            "linux-image-6.1.0-21-amd64\nlibc6\n",
        );
    let exec = quiet_runner();
    let prompt = AutoConfirm::no();

    let run = run_plan(&config, &host, &exec, &FakeFetcher::offline(), &prompt);

    assert_eq!(run.final_report.reboot, RebootDecision::Declined);
    let asked = prompt.asked();
    let question = asked.last().unwrap();
    assert!(
        question.contains("libc6, linux-image-6.1.0-21-amd64"),
        "{}",
        question
    );
}

#[test]
fn test_low_disk_stops_before_any_step() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let host = debian_host().with_available_kb(300 * 1024);

    let err = Preflight::new(&config, &host).check().unwrap_err();
    assert!(matches!(err, PreconditionError::InsufficientDiskSpace { .. }));
    let text = err.to_string();
    assert!(text.contains("300MB"), "{}", text);
    assert!(text.contains("1GB"), "{}", text);

    let ctx = RunContext::new(config, host.hostname());
    assert!(ctx.outcomes().is_empty());
}

#[test]
fn test_missing_tools_listed_together() {
    let config = HostkeepConfig::default();
    let host = FakeHost::new().with_tools(&["uname"]);

    match Preflight::new(&config, &host).check() {
        Err(PreconditionError::MissingDependency(missing)) => {
            assert_eq!(missing, vec!["apt-get", "dpkg"]);
        }
        other => panic!("unexpected preflight result: {:?}", other),
    }
}
