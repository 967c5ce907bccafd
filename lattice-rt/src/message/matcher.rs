// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::types::{Message, TypeMask};

/// Declarative message matcher: a type mask plus a topic glob.
///
/// The glob supports the forms the registration protocol produces: a bare
/// `*` (any topic), a trailing-`*` prefix pattern such as the `name.*`
/// matchers built for registered services, and otherwise an exact topic.
///
/// # Example
/// ```rust
/// use lattice_rt::message::{Message, MessageMatch};
///
/// let m = MessageMatch::service("kvs");
/// assert!(m.matches(&Message::request("kvs.get")));
/// assert!(!m.matches(&Message::request("kvs")));
/// assert!(!m.matches(&Message::request("job.submit")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMatch {
    /// Message types this matcher accepts.
    pub typemask: TypeMask,
    /// Topic glob (exact topic, `prefix*`, or `*`).
    pub topic_glob: String,
}

impl MessageMatch {
    /// Match `glob` against any message type.
    pub fn any(glob: impl Into<String>) -> Self {
        Self {
            typemask: TypeMask::all(),
            topic_glob: glob.into(),
        }
    }

    /// Match `glob` against request messages only.
    pub fn requests(glob: impl Into<String>) -> Self {
        Self {
            typemask: TypeMask::REQUEST,
            topic_glob: glob.into(),
        }
    }

    /// The matcher a service registration installs: requests whose topic
    /// falls under `name.` (the `name + ".*"` glob).
    pub fn service(name: &str) -> Self {
        Self::requests(format!("{name}.*"))
    }

    /// True if `msg` has an accepted type and a topic accepted by the glob.
    pub fn matches(&self, msg: &Message) -> bool {
        self.typemask.contains(msg.msg_type.mask()) && glob_match(&self.topic_glob, &msg.topic)
    }
}

fn glob_match(glob: &str, topic: &str) -> bool {
    match glob.strip_suffix('*') {
        Some("") => true,
        Some(prefix) => topic.starts_with(prefix),
        None => topic == glob,
    }
}
