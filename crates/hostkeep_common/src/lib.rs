//! Hostkeep Common - Maintenance engine for Debian-family hosts
//!
//! Preflight checks, the ordered step plan, the step runner, helper
//! staging and the final report. Everything that touches the host goes
//! through `CommandRunner`, `HostProbe`, `HelperFetcher` and `Confirm`, so
//! a full run can be driven with fakes.

pub mod cleanup;
pub mod command_exec;
pub mod config;
pub mod display;
pub mod error;
pub mod features;
pub mod helper_stager;
pub mod host;
pub mod preflight;
pub mod prompt;
pub mod report;
pub mod run_lock;
pub mod runner;
pub mod steps;
pub mod tasks;

pub use cleanup::{CleanupRegistry, EXIT_INTERRUPTED};
pub use command_exec::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use config::{HelperPolicy, HostkeepConfig};
pub use error::{ConfigError, LockError, PreconditionError, StagingError};
pub use helper_stager::{HelperStager, HttpFetcher};
pub use host::{HostProbe, SystemHost};
pub use preflight::Preflight;
pub use prompt::{AutoConfirm, Confirm, TerminalPrompt};
pub use report::{FinalReport, Finalizer, EXIT_HARD_FAILURE, EXIT_PRECONDITION, EXIT_SUCCESS};
pub use run_lock::RunLock;
pub use runner::{RunContext, StepRunner};
pub use steps::{FailureMode, MaintenanceStep, StepOutcome, StepStatus};
pub use tasks::standard_plan;
