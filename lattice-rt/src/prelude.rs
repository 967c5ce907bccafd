//! Prelude module for convenient imports.
//!
//! Re-exports the types most embedding brokers and module authors need:
//!
//! ```rust
//! use lattice_rt::prelude::*;
//! ```

// Message plane
pub use crate::message::{
    Credentials, Message, MessageFlags, MessageMatch, MessageType, RoleMask,
};

// Module-side handle
pub use crate::handle::{HandleError, HandleStats, ModuleHandle};

// Module hosting
pub use crate::module::{
    Module, ModuleEntry, ModuleError, ModuleHost, ModuleHostConfig, ModuleMainError,
    ModuleStatus, ModuleStatusPayload, MODULE_STATUS_TOPIC,
};

// Configuration
pub use crate::config::{AttrCache, ConfigSnapshot};

// Router service registration
pub use crate::servhash::{EntryState, ServhashError, ServiceHash, Upstream, UpstreamError};

// Utilities
pub use crate::util::ModuleId;
