// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::endpoint::EndpointError;
use crate::util::errnum;

/// Errors surfaced by module-handle operations.
#[derive(Debug, Error)]
pub enum HandleError {
    /// The broker side of the endpoint is gone.
    #[error("connection to broker lost")]
    Disconnected,

    /// The broker asked this module to shut down (`<name>.shutdown`).
    ///
    /// Not a failure: the entry point should unwind its loop and return.
    #[error("shutdown requested")]
    Shutdown,

    /// An RPC completed with a non-zero error number.
    #[error("rpc {topic} failed with errnum {errnum}")]
    Rpc {
        /// Topic of the failed RPC.
        topic: String,
        /// Wire error number from the response.
        errnum: i32,
    },

    /// A payload could not be encoded or decoded.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl HandleError {
    /// Wire error number for this failure (0 for a clean shutdown).
    pub fn errnum(&self) -> i32 {
        match self {
            Self::Disconnected => errnum::ECONNRESET,
            Self::Shutdown => 0,
            Self::Rpc { errnum, .. } => *errnum,
            Self::Payload(_) => errnum::EINVAL,
        }
    }
}

impl From<EndpointError> for HandleError {
    fn from(_: EndpointError) -> Self {
        Self::Disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errnum_mapping() {
        assert_eq!(HandleError::Disconnected.errnum(), errnum::ECONNRESET);
        assert_eq!(HandleError::Shutdown.errnum(), 0);
        assert_eq!(
            HandleError::Rpc {
                topic: "a.b".into(),
                errnum: errnum::ENOSYS,
            }
            .errnum(),
            errnum::ENOSYS
        );
    }

    #[test]
    fn test_endpoint_error_converts() {
        let err: HandleError = EndpointError::Closed.into();
        assert!(matches!(err, HandleError::Disconnected));
    }
}
