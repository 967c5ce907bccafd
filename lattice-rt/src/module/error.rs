// Layer 1: Standard library imports
use std::io;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::endpoint::EndpointError;
use crate::util::errnum;

/// Errors surfaced by module records and the module host.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The plugin image could not be loaded.
    #[error("cannot load module {path}: {reason}")]
    NotFound {
        /// Path of the missing or unloadable image.
        path: String,
        /// Loader diagnostic.
        reason: String,
    },

    /// Null or contradictory inputs: missing entry point, legacy name
    /// mismatch, record reuse after start.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A module with the same path, name, or uuid is already hosted.
    #[error("module already exists: {0}")]
    Exists(String),

    /// No hosted module under the given key.
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// Message sent into a muted module that is not the module-status reply.
    #[error("module is muted; refusing {topic}")]
    Unsupported {
        /// Topic of the refused message.
        topic: String,
    },

    /// A message violated routing expectations (e.g. response with an empty
    /// routing stack).
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The endpoint to the module worker is closed.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// The worker thread could not be spawned.
    #[error("cannot spawn module thread: {0}")]
    ThreadSpawn(#[source] io::Error),
}

impl ModuleError {
    /// Wire error number for this failure.
    pub fn errnum(&self) -> i32 {
        match self {
            Self::NotFound { .. } | Self::UnknownModule(_) => errnum::ENOENT,
            Self::InvalidArgument(_) | Self::MalformedMessage(_) => errnum::EINVAL,
            Self::Exists(_) => errnum::EEXIST,
            Self::Unsupported { .. } => errnum::ENOSYS,
            Self::Endpoint(e) => e.errnum(),
            Self::ThreadSpawn(e) => e.raw_os_error().unwrap_or(errnum::ENOMEM),
        }
    }
}
