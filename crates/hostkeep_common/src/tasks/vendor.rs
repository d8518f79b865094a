//! Vendor-supplied maintenance script

use crate::command_exec::CommandSpec;
use crate::features::Eligibility;
use crate::runner::StepEnv;
use crate::steps::StepResult;

pub fn eligibility(env: &StepEnv<'_>) -> Eligibility {
    let script = &env.config.vendor_script;
    Eligibility::when(
        env.host.path_exists(script),
        format!("no vendor script at {}", script.display()),
    )
}

/// Make the script executable, then run it with no arguments
pub fn run_vendor_script(env: &StepEnv<'_>) -> StepResult {
    let script = env.config.vendor_script.display().to_string();
    env.run(&CommandSpec::new("chmod").args(["+x", script.as_str()]))?;
    env.run(&CommandSpec::new(script.clone()))?;
    Ok(format!("{} completed", script))
}
