//! Router-side proxy for dynamic service registration.
//!
//! A router sits between clients and an upstream broker. When a client
//! registers a service, the router must forward the registration upstream,
//! keep its own table of who owns what, route matching requests back to the
//! owner, and unwind every registration when the client disconnects or the
//! router exits. [`ServiceHash`] provides exactly that:
//!
//! - [`ServiceHash::add`] / [`ServiceHash::remove`] proxy client requests
//!   into asynchronous upstream registration, responding to the retained
//!   client request when the upstream answer arrives
//! - [`ServiceHash::match_owner`] resolves a request message to the owning
//!   client
//! - [`ServiceHash::disconnect`] sweeps every entry a departing client owns
//! - entry teardown emits a best-effort "open-loop" upstream unregister
//!   whenever an upstream registration could otherwise be left behind
//!
//! The hash is single-threaded cooperative (router reactor); upstream
//! completions re-enter it through short critical sections.

pub mod entry;
pub mod error;
pub mod hash;
pub mod upstream;

pub use entry::EntryState;
pub use error::ServhashError;
pub use hash::{RespondCallback, ServiceHash};
pub use upstream::{Upstream, UpstreamError, SERVICE_REGISTER_TOPIC, SERVICE_UNREGISTER_TOPIC};
