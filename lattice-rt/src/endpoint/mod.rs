//! Point-to-point message channel between a broker and one module.
//!
//! An endpoint is the only state shared between the broker reactor and a
//! module worker thread; all coordination is by message. Each end is owned
//! by exactly one side: the broker end is touched only from the reactor, the
//! module end only from the worker thread. Message order is FIFO in each
//! direction, capacity is unbounded, and dropping an end closes the channel
//! for the peer.

pub mod error;
pub mod pair;

pub use error::EndpointError;
pub use pair::{BrokerEnd, Endpoint, EndpointReceiver, EndpointSender, ModuleEnd};
