//! The in-process module host.
//!
//! A module is a pluggable service running on its own worker thread inside
//! the broker, reachable only through a point-to-point endpoint. This area
//! owns the whole lifecycle:
//!
//! - [`Module`] - the broker-side record: image, endpoint, worker thread,
//!   credentials, subscriptions, pending insmod/rmmod requests, status
//! - [`ModuleHost`] - the record collection with name/uuid/path lookups,
//!   event fan-out, and the internal status/subscription services
//! - [`ModuleImage`] - dynamically loaded or built-in entry points
//! - [`ModuleStatus`] - the `INIT -> RUNNING -> FINALIZING -> EXITED`
//!   state machine with its wire tags
//! - [`DisconnectTracker`] - synthetic disconnects for contacted services
//!
//! The runtime shim that runs on the worker thread lives in `runtime` and
//! is not public: modules only ever see a [`crate::handle::ModuleHandle`].

pub mod disconnect;
pub mod error;
pub mod host;
pub mod plugin;
pub mod record;
mod runtime;
pub mod status;

pub use disconnect::{DisconnectSendFn, DisconnectTracker};
pub use error::ModuleError;
pub use host::{
    HostStatusCallback, ModuleHost, ModuleHostConfig, ReceiverCallback, ResponderCallback,
    EVENT_SUBSCRIBE_TOPIC, EVENT_UNSUBSCRIBE_TOPIC,
};
pub use plugin::{ModuleEntry, ModuleImage, ModuleMainError, ENTRY_SYMBOL, LEGACY_NAME_SYMBOL};
pub use record::{Module, PollerCallback, StatusCallback};
pub use status::{ModuleStatus, ModuleStatusPayload, MODULE_STATUS_TOPIC};
