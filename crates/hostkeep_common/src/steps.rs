//! Maintenance steps and their outcomes
//!
//! A step is one discrete maintenance action: a body that drives the
//! command executor, a failure mode deciding whether a failure halts the
//! run, an optional eligibility predicate and an optional confirmation
//! question. The list is built once at startup and never mutated.

use crate::features::Eligibility;
use crate::runner::StepEnv;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a failed step does to the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// Failure is hard: remaining steps are not run
    AbortOnFailure,
    /// Failure is soft: recorded, run continues
    ContinueOnFailure,
}

/// Failure reported by a step body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub message: String,
}

impl StepFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Ok carries the success message
pub type StepResult = Result<String, StepFailure>;

pub type StepBody = Box<dyn Fn(&StepEnv<'_>) -> StepResult>;
pub type EligibilityFn = Box<dyn Fn(&StepEnv<'_>) -> Eligibility>;

pub struct MaintenanceStep {
    pub name: String,
    pub title: String,
    pub failure_mode: FailureMode,
    /// Question asked before running; None for non-interactive steps
    pub confirmation: Option<String>,
    body: StepBody,
    eligibility: Option<EligibilityFn>,
}

impl MaintenanceStep {
    pub fn new<F>(name: &str, title: &str, failure_mode: FailureMode, body: F) -> Self
    where
        F: Fn(&StepEnv<'_>) -> StepResult + 'static,
    {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            failure_mode,
            confirmation: None,
            body: Box::new(body),
            eligibility: None,
        }
    }

    pub fn eligible_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&StepEnv<'_>) -> Eligibility + 'static,
    {
        self.eligibility = Some(Box::new(predicate));
        self
    }

    pub fn confirm(mut self, question: &str) -> Self {
        self.confirmation = Some(question.to_string());
        self
    }

    pub fn eligibility(&self, env: &StepEnv<'_>) -> Eligibility {
        match &self.eligibility {
            Some(predicate) => predicate(env),
            None => Eligibility::Eligible,
        }
    }

    pub fn execute(&self, env: &StepEnv<'_>) -> StepResult {
        (self.body)(env)
    }
}

impl fmt::Debug for MaintenanceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaintenanceStep")
            .field("name", &self.name)
            .field("failure_mode", &self.failure_mode)
            .field("interactive", &self.confirmation.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Succeeded,
    Skipped,
    SoftFailed,
    HardFailed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Skipped => "skipped",
            StepStatus::SoftFailed => "soft-failed",
            StepStatus::HardFailed => "hard-failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StepStatus::SoftFailed | StepStatus::HardFailed)
    }

    /// Classify a finished body under its failure mode
    pub fn classify(result: &StepResult, mode: FailureMode) -> Self {
        match (result, mode) {
            (Ok(_), _) => StepStatus::Succeeded,
            (Err(_), FailureMode::ContinueOnFailure) => StepStatus::SoftFailed,
            (Err(_), FailureMode::AbortOnFailure) => StepStatus::HardFailed,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one step's result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// 1-based position in the step list
    pub position: usize,
    pub step: String,
    pub status: StepStatus,
    pub message: String,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let ok: StepResult = Ok("done".into());
        let failed: StepResult = Err(StepFailure::new("boom"));

        assert_eq!(
            StepStatus::classify(&ok, FailureMode::AbortOnFailure),
            StepStatus::Succeeded
        );
        assert_eq!(
            StepStatus::classify(&failed, FailureMode::ContinueOnFailure),
            StepStatus::SoftFailed
        );
        assert_eq!(
            StepStatus::classify(&failed, FailureMode::AbortOnFailure),
            StepStatus::HardFailed
        );
    }

    #[test]
    fn test_status_serializes_kebab() {
        assert_eq!(
            serde_json::to_string(&StepStatus::SoftFailed).unwrap(),
            "\"soft-failed\""
        );
        assert!(!StepStatus::Skipped.is_failure());
    }
}
