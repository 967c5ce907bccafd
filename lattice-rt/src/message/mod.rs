//! Message plane types for the broker/module boundary.
//!
//! Every interaction between the broker, its modules, and router clients is
//! a [`Message`]: a typed, topic-tagged unit carrying an optional JSON
//! payload, a routing stack of hop identifiers, and the credentials of its
//! originator. The type tag is a closed variant set (request, response,
//! event, control); dispatching on it is always an exhaustive `match`.
//!
//! # Components
//!
//! - [`Message`] - the message itself, with builder-style constructors
//! - [`MessageType`] / [`TypeMask`] - closed type tags and match masks
//! - [`MessageFlags`] - wire flags (`NO_RESPONSE`)
//! - [`Credentials`] / [`RoleMask`] - (userid, role-mask) pairs
//! - [`MessageMatch`] - type + topic-glob matcher (`name.*` form)

pub mod credentials;
pub mod matcher;
pub mod types;

pub use credentials::{Credentials, RoleMask, USERID_UNKNOWN};
pub use matcher::MessageMatch;
pub use types::{Message, MessageFlags, MessageType, TypeMask};
