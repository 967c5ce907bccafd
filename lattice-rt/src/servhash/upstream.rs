// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Topic of the upstream registration request.
pub const SERVICE_REGISTER_TOPIC: &str = "service.register";

/// Topic of the upstream unregistration request.
pub const SERVICE_UNREGISTER_TOPIC: &str = "service.unregister";

/// Failure of an upstream registration RPC, carrying the wire error number
/// forwarded verbatim to the originating client.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("upstream error with errnum {errnum}")]
pub struct UpstreamError {
    /// Wire error number from the upstream response.
    pub errnum: i32,
}

impl UpstreamError {
    /// Failure with an explicit error number.
    pub fn new(errnum: i32) -> Self {
        Self { errnum }
    }
}

/// The upstream broker's dynamic service registration interface, as seen by
/// a router.
///
/// Implementations wrap the router's upstream handle; completions have no
/// per-request timeout, relying on handle-level cancellation at disconnect.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Register `name` upstream (`service.register`).
    async fn service_register(&self, name: &str) -> Result<(), UpstreamError>;

    /// Unregister `name` upstream (`service.unregister`).
    async fn service_unregister(&self, name: &str) -> Result<(), UpstreamError>;
}
