// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::util::errnum;

/// Errors surfaced by service-hash operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServhashError {
    /// A service with this name is already registered.
    #[error("service already registered: {0}")]
    Exists(String),

    /// No matching entry: unknown name, owner mismatch, or a remove is
    /// already in flight.
    #[error("no service entry: {0}")]
    NoEntry(String),
}

impl ServhashError {
    /// Wire error number for this failure.
    pub fn errnum(&self) -> i32 {
        match self {
            Self::Exists(_) => errnum::EEXIST,
            Self::NoEntry(_) => errnum::ENOENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errnum_mapping() {
        assert_eq!(ServhashError::Exists("a".into()).errnum(), errnum::EEXIST);
        assert_eq!(ServhashError::NoEntry("a".into()).errnum(), errnum::ENOENT);
    }
}
