//! Conditional feature selection
//!
//! Pure predicates over host state deciding which optional steps may run.
//! Evaluated fresh on every run; nothing here is cached.

use crate::host::HostProbe;

/// Substring identifying the target board family
pub const TARGET_HARDWARE: &str = "Raspberry Pi";

/// Result of an eligibility predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Carries the reason recorded with the `skipped` outcome
    Ineligible(String),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    /// Eligible when `cond` holds, otherwise ineligible with `reason`
    pub fn when(cond: bool, reason: impl Into<String>) -> Self {
        if cond {
            Eligibility::Eligible
        } else {
            Eligibility::Ineligible(reason.into())
        }
    }

    /// First ineligible result wins
    pub fn and(self, other: impl FnOnce() -> Eligibility) -> Self {
        match self {
            Eligibility::Eligible => other(),
            ineligible => ineligible,
        }
    }
}

/// Is this Raspberry Pi-class hardware?
pub fn is_target_hardware(host: &dyn HostProbe) -> bool {
    host.hardware_model()
        .map(|m| m.contains(TARGET_HARDWARE))
        .unwrap_or(false)
}

pub fn tool_present(host: &dyn HostProbe, name: &str) -> bool {
    host.tool_present(name)
}

/// Eligibility gated on a tool being installed
pub fn requires_tool(host: &dyn HostProbe, name: &str, what: &str) -> Eligibility {
    Eligibility::when(tool_present(host, name), format!("{} not installed", what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FakeHost;

    #[test]
    fn test_target_hardware_detection() {
        let pi = FakeHost::new().with_model("Raspberry Pi 5 Model B Rev 1.0");
        let pc = FakeHost::new().with_model("QEMU Standard PC");
        let unknown = FakeHost::new();

        assert!(is_target_hardware(&pi));
        assert!(!is_target_hardware(&pc));
        assert!(!is_target_hardware(&unknown));
    }

    #[test]
    fn test_requires_tool_reason() {
        let host = FakeHost::new();
        assert_eq!(
            requires_tool(&host, "docker", "runtime"),
            Eligibility::Ineligible("runtime not installed".to_string())
        );
    }

    #[test]
    fn test_and_short_circuits() {
        let mut evaluated = false;
        let result = Eligibility::Ineligible("first".into()).and(|| {
            evaluated = true;
            Eligibility::Eligible
        });
        assert_eq!(result, Eligibility::Ineligible("first".into()));
        assert!(!evaluated);
        assert!(Eligibility::Eligible.and(|| Eligibility::Eligible).is_eligible());
    }
}
