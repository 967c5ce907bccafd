// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Topic of the internal status RPC a module sends as it moves through its
/// lifecycle. FINALIZING expects a reply; RUNNING and EXITED do not.
pub const MODULE_STATUS_TOPIC: &str = "broker.module-status";

/// Module lifecycle status.
///
/// # State Transitions
///
/// ```text
/// Init -> Running -> Finalizing -> Exited
///            \______________________/
/// ```
///
/// A record starts in `Init` and may reach `Running` directly after a
/// successful start. Transitions back into `Init` and out of `Exited` are
/// forbidden. The discriminants are wire values carried in the
/// `broker.module-status` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ModuleStatus {
    /// Record created, worker thread not announced yet.
    Init = 1,
    /// Worker thread is up and serving messages.
    Running = 2,
    /// Worker is shutting down; the broker has stopped feeding it traffic.
    Finalizing = 4,
    /// Terminal. The worker has exited (or the record was torn down).
    Exited = 8,
}

impl ModuleStatus {
    /// The wire integer for this status.
    pub fn as_wire(self) -> i32 {
        self as i32
    }

    /// Parse a wire integer; `None` for anything outside the contract.
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Init),
            2 => Some(Self::Running),
            4 => Some(Self::Finalizing),
            8 => Some(Self::Exited),
            _ => None,
        }
    }

    /// True for the terminal status.
    pub fn is_exited(self) -> bool {
        self == Self::Exited
    }
}

impl Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Running => "running",
            Self::Finalizing => "finalizing",
            Self::Exited => "exited",
        };
        write!(f, "{s}")
    }
}

/// Payload of the `broker.module-status` RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatusPayload {
    /// Wire value of the announced status.
    pub status: i32,
    /// Saved terminal error number; present on EXITED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errnum: Option<i32>,
}

impl ModuleStatusPayload {
    /// Payload announcing `status` with no error number.
    pub fn new(status: ModuleStatus) -> Self {
        Self {
            status: status.as_wire(),
            errnum: None,
        }
    }

    /// Payload announcing EXITED with the saved error number.
    pub fn exited(errnum: i32) -> Self {
        Self {
            status: ModuleStatus::Exited.as_wire(),
            errnum: Some(errnum),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags_are_contract() {
        assert_eq!(ModuleStatus::Init.as_wire(), 1);
        assert_eq!(ModuleStatus::Running.as_wire(), 2);
        assert_eq!(ModuleStatus::Finalizing.as_wire(), 4);
        assert_eq!(ModuleStatus::Exited.as_wire(), 8);
    }

    #[test]
    fn test_from_wire_roundtrip() {
        for status in [
            ModuleStatus::Init,
            ModuleStatus::Running,
            ModuleStatus::Finalizing,
            ModuleStatus::Exited,
        ] {
            assert_eq!(ModuleStatus::from_wire(status.as_wire()), Some(status));
        }
        assert_eq!(ModuleStatus::from_wire(0), None);
        assert_eq!(ModuleStatus::from_wire(3), None);
    }

    #[test]
    fn test_payload_omits_absent_errnum() {
        let json = serde_json::to_value(ModuleStatusPayload::new(ModuleStatus::Finalizing)).unwrap();
        assert_eq!(json, serde_json::json!({"status": 4}));

        let json = serde_json::to_value(ModuleStatusPayload::exited(42)).unwrap();
        assert_eq!(json, serde_json::json!({"status": 8, "errnum": 42}));
    }

    #[test]
    fn test_only_exited_is_terminal() {
        assert!(ModuleStatus::Exited.is_exited());
        assert!(!ModuleStatus::Finalizing.is_exited());
    }
}
