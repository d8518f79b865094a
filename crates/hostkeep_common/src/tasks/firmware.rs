//! Optional firmware steps
//!
//! Two separate mechanisms, each its own step with its own eligibility:
//! the Raspberry Pi bootloader EEPROM updater and fwupd. They share only
//! the optional-step pattern, never a code path.

use crate::command_exec::CommandSpec;
use crate::features::{is_target_hardware, requires_tool, Eligibility};
use crate::runner::StepEnv;
use crate::steps::StepResult;

pub const EEPROM_TOOL: &str = "rpi-eeprom-update";
pub const FWUPD_TOOL: &str = "fwupdmgr";

/// fwupdmgr exits 2 when there is nothing to do
const FWUPD_NOTHING_TO_DO: i32 = 2;

// ============================================================================
// Raspberry Pi EEPROM
// ============================================================================

pub fn eeprom_eligibility(env: &StepEnv<'_>) -> Eligibility {
    Eligibility::when(is_target_hardware(env.host), "not Raspberry Pi hardware")
        .and(|| requires_tool(env.host, EEPROM_TOOL, EEPROM_TOOL))
}

pub fn update_eeprom(env: &StepEnv<'_>) -> StepResult {
    let output = env.run(&CommandSpec::new(EEPROM_TOOL).arg("-a"))?;
    Ok(if eeprom_update_pending(&output.stdout) {
        "bootloader EEPROM update staged, applies at next reboot".to_string()
    } else {
        "bootloader EEPROM up to date".to_string()
    })
}

/// rpi-eeprom-update prints "EEPROM updates pending" once an image is staged
pub fn eeprom_update_pending(stdout: &str) -> bool {
    let lower = stdout.to_ascii_lowercase();
    lower.contains("updates pending") || lower.contains("update available")
}

// ============================================================================
// fwupd
// ============================================================================

pub fn fwupd_eligibility(env: &StepEnv<'_>) -> Eligibility {
    requires_tool(env.host, FWUPD_TOOL, FWUPD_TOOL)
}

fn fwupdmgr<const N: usize>(args: [&str; N]) -> CommandSpec {
    CommandSpec::new(FWUPD_TOOL)
        .args(args)
        .arg("--no-unreported-check")
        .benign_codes(&[FWUPD_NOTHING_TO_DO])
}

pub fn update_fwupd(env: &StepEnv<'_>) -> StepResult {
    let devices = fwupdmgr(["get-devices"]);
    if env.run(&devices)?.was_noop(&devices) {
        return Ok("no firmware-updatable devices".to_string());
    }

    env.run(&fwupdmgr(["refresh", "--force"]))?;

    let check = fwupdmgr(["get-updates"]);
    if env.run(&check)?.was_noop(&check) {
        return Ok("no firmware updates available".to_string());
    }

    let apply = fwupdmgr(["update", "-y", "--no-reboot-check"]);
    if env.run(&apply)?.was_noop(&apply) {
        return Ok("no firmware updates applied".to_string());
    }
    Ok("firmware updates applied".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eeprom_update_pending() {
        assert!(eeprom_update_pending(
            "*** UPDATING EEPROM ***\nEEPROM updates pending. Please reboot to apply the update.\n"
        ));
        assert!(!eeprom_update_pending(
            "BOOTLOADER: up to date\n   CURRENT: Tue 25 Jan 2022\n    LATEST: Tue 25 Jan 2022\n"
        ));
    }

    #[test]
    fn test_fwupdmgr_spec() {
        let spec = fwupdmgr(["get-updates"]);
        assert_eq!(spec.command_line(), "fwupdmgr get-updates --no-unreported-check");
        assert_eq!(spec.benign_codes, vec![2]);
    }
}
