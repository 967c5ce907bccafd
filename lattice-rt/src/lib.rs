//! # lattice-rt - Broker Module Host Runtime
//!
//! The in-process module host of the lattice message broker, plus the
//! router-side service-registration hash. A module is a pluggable service
//! loaded into the broker: it gets its own worker thread, a private
//! point-to-point endpoint bridged to the broker reactor, credential
//! stamping on every message it exchanges, topic-prefix event
//! subscriptions, and a strict lifecycle that guarantees no message is ever
//! delivered into a torn-down endpoint and no registration outlives its
//! owner.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lattice_rt::prelude::*;
//! use std::sync::Arc;
//!
//! fn heartbeat(h: &mut ModuleHandle, _args: &[String]) -> Result<(), ModuleMainError> {
//!     h.event_subscribe("heartbeat.")?;
//!     loop {
//!         match h.recv() {
//!             Ok(msg) => println!("{}", msg.topic),
//!             Err(HandleError::Shutdown) => return Ok(()),
//!             Err(e) => return Err(e.into()),
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = ModuleHost::new(ModuleHostConfig::default());
//!     host.load_native("heartbeat", heartbeat, vec![])?;
//!     host.event_cast(&Message::event("heartbeat.pulse"));
//!     host.stop("heartbeat")?;
//!     Ok(())
//! }
//! ```
//!
//! # Lifecycle Protocol
//!
//! A module moves through `INIT -> RUNNING -> FINALIZING -> EXITED`; the
//! wire tags of these states are part of the `broker.module-status`
//! contract. Shutdown hinges on one ordering guarantee: the worker's
//! **synchronous FINALIZING RPC**. After the broker acknowledges it, the
//! broker stops feeding the module traffic (the record is *muted*), and
//! only then does the worker drain leftover requests, publish EXITED, and
//! close its handle. Teardown of a record that never reached EXITED forces
//! the terminal transition so the status callback runs (and service
//! bindings drop) before the record itself is released.
//!
//! # Module Organization
//!
//! ## Message Plane
//! - [`message`] - typed messages, routing stacks, credentials, matchers
//! - [`endpoint`] - the broker/module point-to-point channel
//! - [`handle`] - the module-side handle with RPC and built-in services
//!
//! ## Hosting
//! - [`module`] - module records, the host table, images, disconnects
//! - [`config`] - configuration snapshot and attribute cache
//!
//! ## Routing
//! - [`servhash`] - router-side proxy for upstream service registration
//!
//! ## Infrastructure
//! - [`util`] - module ids and wire error numbers
//!
//! # Concurrency Model
//!
//! The broker reactor is a tokio runtime; per-module watchers are tasks.
//! Each module runs exactly one OS worker thread that blocks on its handle.
//! The only state shared between broker and module is the endpoint - all
//! coordination is by message.

pub mod config;
pub mod endpoint;
pub mod handle;
pub mod message;
pub mod module;
pub mod prelude;
pub mod servhash;
pub mod util;

// Re-export commonly used types
pub use config::{AttrCache, ConfigSnapshot};
pub use endpoint::{BrokerEnd, Endpoint, EndpointError, ModuleEnd};
pub use handle::{HandleError, HandleParams, HandleStats, ModuleHandle};
pub use message::{
    Credentials, Message, MessageFlags, MessageMatch, MessageType, RoleMask, TypeMask,
};
pub use module::{
    DisconnectTracker, Module, ModuleEntry, ModuleError, ModuleHost, ModuleHostConfig,
    ModuleImage, ModuleMainError, ModuleStatus, ModuleStatusPayload, MODULE_STATUS_TOPIC,
};
pub use servhash::{EntryState, ServhashError, ServiceHash, Upstream, UpstreamError};
pub use util::ModuleId;
