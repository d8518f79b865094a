//! The maintenance plan
//!
//! Order is fixed: package lists before the upgrade, cleanup after it (so
//! newly obsolete packages are known), helper staging before its use,
//! hardware-specific work last.

pub mod apt;
pub mod containers;
pub mod firmware;
pub mod journal;
pub mod kernels;
pub mod vendor;

use crate::features::requires_tool;
use crate::steps::{FailureMode, MaintenanceStep};

use FailureMode::{AbortOnFailure, ContinueOnFailure};

pub fn standard_plan() -> Vec<MaintenanceStep> {
    vec![
        MaintenanceStep::new(
            "package-lists",
            "Refresh package lists",
            AbortOnFailure,
            apt::refresh_package_lists,
        ),
        MaintenanceStep::new(
            "install-dependencies",
            "Install helper dependencies",
            ContinueOnFailure,
            apt::install_dependencies,
        ),
        MaintenanceStep::new(
            "full-upgrade",
            "Full system upgrade",
            AbortOnFailure,
            apt::full_upgrade,
        ),
        MaintenanceStep::new("snap-refresh", "Refresh snaps", ContinueOnFailure, apt::snap_refresh)
            .eligible_when(|env| requires_tool(env.host, "snap", "snapd")),
        MaintenanceStep::new(
            "cleanup",
            "Remove unused packages and clean cache",
            ContinueOnFailure,
            apt::cleanup,
        ),
        MaintenanceStep::new(
            "kernel-prune",
            "Prune old kernels",
            ContinueOnFailure,
            kernels::prune_old_kernels,
        )
        .eligible_when(|env| requires_tool(env.host, "dpkg-query", "dpkg-query")),
        MaintenanceStep::new(
            "journal-vacuum",
            "Trim journal",
            ContinueOnFailure,
            journal::vacuum_journal,
        )
        .eligible_when(|env| requires_tool(env.host, "journalctl", "journalctl")),
        MaintenanceStep::new(
            "container-maintenance",
            "Container runtime maintenance",
            ContinueOnFailure,
            containers::maintain_containers,
        )
        .eligible_when(containers::eligibility),
        MaintenanceStep::new(
            "eeprom-update",
            "Raspberry Pi bootloader EEPROM",
            ContinueOnFailure,
            firmware::update_eeprom,
        )
        .eligible_when(firmware::eeprom_eligibility)
        .confirm("Check and apply Raspberry Pi bootloader EEPROM updates?"),
        MaintenanceStep::new(
            "fwupd-update",
            "Firmware updates (fwupd)",
            ContinueOnFailure,
            firmware::update_fwupd,
        )
        .eligible_when(firmware::fwupd_eligibility)
        .confirm("Check and install firmware updates with fwupd?"),
        MaintenanceStep::new(
            "vendor-script",
            "Vendor maintenance script",
            ContinueOnFailure,
            vendor::run_vendor_script,
        )
        .eligible_when(vendor::eligibility),
    ]
}
