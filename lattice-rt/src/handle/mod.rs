//! Module-side handle onto the broker's message plane.
//!
//! The handle is what a module entry point programs against: it wraps the
//! module end of the endpoint and offers typed send/receive, synchronous
//! RPC with correlation matching, event subscription, and the built-in
//! per-module services (`<name>.ping`, `<name>.stats-get`). It also carries
//! the configuration snapshot and attribute cache primed by the runtime
//! shim, so lookups never leave the worker thread.
//!
//! A handle is single-owner: it lives on the module's worker thread and is
//! never shared.

pub mod error;
pub mod module_handle;

pub use error::HandleError;
pub use module_handle::{HandleParams, HandleStats, ModuleHandle};
