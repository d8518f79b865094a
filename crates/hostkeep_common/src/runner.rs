//! Step Runner
//!
//! Executes the ordered step list exactly once per run:
//! 1. eligibility predicate false -> `skipped`, body never runs, no prompt
//! 2. interactive step -> bounded yes/no prompt, decline -> `skipped`
//! 3. body runs through the command executor
//! 4. classification by failure mode: success, soft failure, hard failure
//! 5. outcome appended to the run context
//!
//! A hard failure stops the loop; later steps get no outcome at all.
//! The runner is the only writer of the outcome sequence.

use crate::command_exec::{CommandOutput, CommandRunner, CommandSpec};
use crate::config::HostkeepConfig;
use crate::display;
use crate::features::Eligibility;
use crate::helper_stager::HelperStager;
use crate::host::HostProbe;
use crate::prompt::Confirm;
use crate::steps::{MaintenanceStep, StepFailure, StepOutcome, StepStatus};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Process-wide state of one invocation
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub hostname: String,
    pub started_at: DateTime<Utc>,
    pub config: HostkeepConfig,
    outcomes: Vec<StepOutcome>,
}

impl RunContext {
    pub fn new(config: HostkeepConfig, hostname: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            hostname: hostname.into(),
            started_at: Utc::now(),
            config,
            outcomes: Vec::new(),
        }
    }

    /// Outcomes in execution order
    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn hard_failure(&self) -> Option<&StepOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.status == StepStatus::HardFailed)
    }

    fn record(&mut self, outcome: StepOutcome) {
        self.outcomes.push(outcome);
    }
}

/// Read-only view handed to step bodies and eligibility predicates
pub struct StepEnv<'a> {
    pub config: &'a HostkeepConfig,
    pub hostname: &'a str,
    pub exec: &'a dyn CommandRunner,
    pub host: &'a dyn HostProbe,
    pub stager: &'a HelperStager<'a>,
}

impl<'a> StepEnv<'a> {
    /// Run one command and classify it: spawn errors and non-benign exit
    /// codes become a `StepFailure` naming the command
    pub fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, StepFailure> {
        let output = self
            .exec
            .run(spec)
            .map_err(|e| StepFailure::new(format!("cannot start `{}`: {}", spec, e)))?;

        if output.succeeded(spec) {
            return Ok(output);
        }

        let detail = output
            .last_error_line()
            .map(|l| format!(": {}", l))
            .unwrap_or_default();
        Err(StepFailure::new(format!(
            "`{}` failed ({}){}",
            spec,
            output.describe_exit(),
            detail
        )))
    }

    /// Run commands in order, stopping at the first failure
    pub fn run_all(&self, specs: &[CommandSpec]) -> Result<Vec<CommandOutput>, StepFailure> {
        specs.iter().map(|s| self.run(s)).collect()
    }
}

/// Summary of the loop itself; outcomes live in the `RunContext`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Steps that produced an outcome
    pub processed: usize,
    /// Name of the hard-failed step, when the run was halted
    pub halted_by: Option<String>,
}

pub struct StepRunner<'a> {
    exec: &'a dyn CommandRunner,
    host: &'a dyn HostProbe,
    prompt: &'a dyn Confirm,
    stager: &'a HelperStager<'a>,
}

impl<'a> StepRunner<'a> {
    pub fn new(
        exec: &'a dyn CommandRunner,
        host: &'a dyn HostProbe,
        prompt: &'a dyn Confirm,
        stager: &'a HelperStager<'a>,
    ) -> Self {
        Self {
            exec,
            host,
            prompt,
            stager,
        }
    }

    pub fn run(&self, steps: &[MaintenanceStep], ctx: &mut RunContext) -> RunReport {
        let total = steps.len();
        let mut report = RunReport {
            processed: 0,
            halted_by: None,
        };

        for (index, step) in steps.iter().enumerate() {
            let position = index + 1;
            let start = Instant::now();
            display::banner(position, total, &step.title);

            let (status, message) = self.process(step, ctx);

            let outcome = StepOutcome {
                position,
                step: step.name.clone(),
                status,
                message,
                duration_ms: start.elapsed().as_millis() as u64,
            };
            display::print_status(outcome.status, &outcome.step, &outcome.message);
            match outcome.status {
                StepStatus::Succeeded | StepStatus::Skipped => {
                    info!("step {} {}: {}", outcome.step, outcome.status, outcome.message)
                }
                StepStatus::SoftFailed => {
                    warn!("step {} {}: {}", outcome.step, outcome.status, outcome.message)
                }
                StepStatus::HardFailed => {
                    error!("step {} {}: {}", outcome.step, outcome.status, outcome.message)
                }
            }

            let halted = outcome.status == StepStatus::HardFailed;
            ctx.record(outcome);
            report.processed += 1;

            if halted {
                error!("halting after hard failure in {}", step.name);
                report.halted_by = Some(step.name.clone());
                break;
            }
        }

        report
    }

    fn process(&self, step: &MaintenanceStep, ctx: &RunContext) -> (StepStatus, String) {
        let env = StepEnv {
            config: &ctx.config,
            hostname: &ctx.hostname,
            exec: self.exec,
            host: self.host,
            stager: self.stager,
        };

        if let Eligibility::Ineligible(reason) = step.eligibility(&env) {
            return (StepStatus::Skipped, reason);
        }

        if let Some(question) = &step.confirmation {
            if !self.prompt.confirm(question, ctx.config.prompt_timeout()) {
                return (StepStatus::Skipped, "user declined".to_string());
            }
        }

        let result = step.execute(&env);
        let status = StepStatus::classify(&result, step.failure_mode);
        let message = match result {
            Ok(message) => message,
            Err(failure) => failure.message,
        };
        (status, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::CleanupRegistry;
    use crate::command_exec::{FakeResponse, FakeRunner};
    use crate::config::HelperPolicy;
    use crate::helper_stager::FakeFetcher;
    use crate::host::FakeHost;
    use crate::prompt::AutoConfirm;
    use crate::steps::FailureMode;

    fn command_step(name: &str, mode: FailureMode) -> MaintenanceStep {
        let program = name.to_string();
        MaintenanceStep::new(name, name, mode, move |env| {
            env.run(&CommandSpec::new(program.clone()))?;
            Ok(format!("{} done", program))
        })
    }

    fn run_steps(
        steps: &[MaintenanceStep],
        exec: &FakeRunner,
        prompt: &AutoConfirm,
    ) -> (RunContext, RunReport) {
        let host = FakeHost::new();
        let fetcher = FakeFetcher::offline();
        let stager = HelperStager::new(&fetcher, CleanupRegistry::new(), HelperPolicy::Persistent);
        let mut ctx = RunContext::new(HostkeepConfig::default(), "testhost");
        let report = StepRunner::new(exec, &host, prompt, &stager).run(steps, &mut ctx);
        (ctx, report)
    }

    #[test]
    fn test_hard_failure_halts() {
        let steps = vec![
            command_step("one", FailureMode::AbortOnFailure),
            command_step("two", FailureMode::AbortOnFailure),
            command_step("three", FailureMode::ContinueOnFailure),
        ];
        let exec = FakeRunner::new().respond("two", FakeResponse::exit(100, "E: broken"));
        let (ctx, report) = run_steps(&steps, &exec, &AutoConfirm::no());

        assert_eq!(report.halted_by.as_deref(), Some("two"));
        assert_eq!(ctx.outcomes().len(), 2);
        assert_eq!(ctx.outcomes()[1].status, StepStatus::HardFailed);
        assert!(ctx.outcomes()[1].message.contains("E: broken"));
        assert_eq!(exec.count("three"), 0);
    }

    #[test]
    fn test_soft_failure_continues() {
        let steps = vec![
            command_step("one", FailureMode::ContinueOnFailure),
            command_step("two", FailureMode::AbortOnFailure),
        ];
        let exec = FakeRunner::new().respond("one", FakeResponse::exit(1, ""));
        let (ctx, report) = run_steps(&steps, &exec, &AutoConfirm::no());

        assert!(report.halted_by.is_none());
        assert_eq!(ctx.outcomes()[0].status, StepStatus::SoftFailed);
        assert_eq!(ctx.outcomes()[1].status, StepStatus::Succeeded);
        assert_eq!(exec.calls(), vec!["one", "two"]);
    }

    #[test]
    fn test_spawn_error_is_classified() {
        let steps = vec![command_step("ghost", FailureMode::ContinueOnFailure)];
        let exec = FakeRunner::new().respond("ghost", FakeResponse::not_found());
        let (ctx, _) = run_steps(&steps, &exec, &AutoConfirm::no());

        assert_eq!(ctx.outcomes()[0].status, StepStatus::SoftFailed);
        assert!(ctx.outcomes()[0].message.starts_with("cannot start `ghost`"));
    }

    #[test]
    fn test_ineligible_step_never_prompts_or_runs() {
        let steps = vec![command_step("fw", FailureMode::ContinueOnFailure)
            .eligible_when(|_| Eligibility::Ineligible("not a Raspberry Pi".into()))
            .confirm("Flash firmware?")];
        let exec = FakeRunner::new();
        let prompt = AutoConfirm::yes();
        let (ctx, _) = run_steps(&steps, &exec, &prompt);

        assert_eq!(ctx.outcomes()[0].status, StepStatus::Skipped);
        assert_eq!(ctx.outcomes()[0].message, "not a Raspberry Pi");
        assert!(prompt.asked().is_empty());
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn test_declined_prompt_skips() {
        let steps = vec![
            command_step("fw", FailureMode::AbortOnFailure).confirm("Flash firmware?"),
            command_step("after", FailureMode::AbortOnFailure),
        ];
        let exec = FakeRunner::new();
        let prompt = AutoConfirm::no();
        let (ctx, _) = run_steps(&steps, &exec, &prompt);

        assert_eq!(ctx.outcomes()[0].status, StepStatus::Skipped);
        assert_eq!(ctx.outcomes()[0].message, "user declined");
        assert_eq!(prompt.asked(), vec!["Flash firmware?"]);
        assert_eq!(exec.calls(), vec!["after"]);
    }

    #[test]
    fn test_positions_follow_order() {
        let steps = vec![
            command_step("a", FailureMode::AbortOnFailure),
            command_step("b", FailureMode::AbortOnFailure),
        ];
        let (ctx, report) = run_steps(&steps, &FakeRunner::new(), &AutoConfirm::no());
        let positions: Vec<usize> = ctx.outcomes().iter().map(|o| o.position).collect();
        assert_eq!(positions, vec![1, 2]);
        assert_eq!(report.processed, 2);
        assert_eq!(ctx.count(StepStatus::Succeeded), 2);
    }
}
