// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Layer 3: Internal module imports
// (none)

/// Unique identifier for a module record.
///
/// The string form of the id doubles as the module's routing identity: it is
/// the hop pushed onto message routing stacks and the name the broker end of
/// the endpoint is bound under. It must stay stable for the record's
/// lifetime.
///
/// # Example
/// ```rust
/// use lattice_rt::util::ModuleId;
///
/// let id1 = ModuleId::new();
/// let id2 = ModuleId::new();
/// assert_ne!(id1, id2); // Globally unique
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleId(Uuid);

impl ModuleId {
    /// Generate a new random ModuleId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a ModuleId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ModuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_creation() {
        let id1 = ModuleId::new();
        let id2 = ModuleId::new();

        assert_ne!(id1, id2); // Should be unique
    }

    #[test]
    fn test_module_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = ModuleId::from_uuid(uuid);

        assert_eq!(id.as_uuid(), &uuid);
    }

    #[test]
    fn test_module_id_display_is_uuid_string() {
        let id = ModuleId::new();
        let display = format!("{id}");

        assert_eq!(display.len(), 36);
        assert!(display.contains('-')); // UUID format
    }

    #[test]
    fn test_module_id_default() {
        let id = ModuleId::default();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }
}
