// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use bitflags::bitflags;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// Layer 3: Internal module imports
use super::credentials::Credentials;

/// Closed set of message type tags.
///
/// The broker and host dispatch on this tag; there is no open-ended message
/// hierarchy. The discriminants are wire values and double as bits in
/// [`TypeMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum MessageType {
    /// A request expecting a response (unless `NO_RESPONSE` is flagged).
    Request = 1,
    /// A response to an earlier request.
    Response = 2,
    /// A published event, fanned out by topic-prefix subscription.
    Event = 4,
    /// Connection-control traffic.
    Control = 8,
}

impl MessageType {
    /// The mask bit for this type, for use with [`TypeMask`] filters.
    pub fn mask(self) -> TypeMask {
        TypeMask::from_bits_truncate(self as u32)
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Event => "event",
            Self::Control => "control",
        };
        write!(f, "{s}")
    }
}

bitflags! {
    /// Bit-set of [`MessageType`] tags, used by receive filters and matchers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TypeMask: u32 {
        /// Matches request messages.
        const REQUEST = 1;
        /// Matches response messages.
        const RESPONSE = 2;
        /// Matches event messages.
        const EVENT = 4;
        /// Matches control messages.
        const CONTROL = 8;
    }
}

bitflags! {
    /// Per-message wire flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MessageFlags: u32 {
        /// The sender does not expect a response to this request.
        const NO_RESPONSE = 1;
    }
}

/// A single message on the broker's message plane.
///
/// Carries the type tag, a dotted topic string, an optional JSON payload,
/// a response error number, the routing stack (ordered hop identifiers used
/// to return a response to its origin; the last element is the most recently
/// pushed hop), originator credentials, and an optional correlation id
/// pairing responses with requests.
///
/// # Example
/// ```rust
/// use lattice_rt::message::{Message, MessageType};
///
/// let req = Message::request("kvs.get").with_payload(serde_json::json!({"key": "a"}));
/// assert_eq!(req.msg_type, MessageType::Request);
///
/// let rep = req.respond();
/// assert_eq!(rep.msg_type, MessageType::Response);
/// assert_eq!(rep.topic, "kvs.get");
/// assert_eq!(rep.errnum, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message type tag.
    pub msg_type: MessageType,
    /// Dotted topic string (`service.method`).
    pub topic: String,
    /// Optional JSON payload.
    pub payload: Option<Value>,
    /// Error number on responses; 0 means success.
    pub errnum: i32,
    /// Routing stack; last element is the most recently pushed hop.
    pub routes: Vec<String>,
    /// Credentials of the originator.
    pub cred: Credentials,
    /// Correlation id pairing a response with its request.
    pub correlation_id: Option<Uuid>,
    /// Wire flags.
    pub flags: MessageFlags,
}

impl Message {
    fn new(msg_type: MessageType, topic: impl Into<String>) -> Self {
        Self {
            msg_type,
            topic: topic.into(),
            payload: None,
            errnum: 0,
            routes: Vec::new(),
            cred: Credentials::default(),
            correlation_id: None,
            flags: MessageFlags::empty(),
        }
    }

    /// Create a request message.
    pub fn request(topic: impl Into<String>) -> Self {
        Self::new(MessageType::Request, topic)
    }

    /// Create a response message. Usually built via [`Message::respond`].
    pub fn response(topic: impl Into<String>) -> Self {
        Self::new(MessageType::Response, topic)
    }

    /// Create an event message.
    pub fn event(topic: impl Into<String>) -> Self {
        Self::new(MessageType::Event, topic)
    }

    /// Create a control message.
    pub fn control(topic: impl Into<String>) -> Self {
        Self::new(MessageType::Control, topic)
    }

    /// Builder method: attach a JSON payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builder method: set originator credentials.
    pub fn with_credentials(mut self, cred: Credentials) -> Self {
        self.cred = cred;
        self
    }

    /// Builder method: set a correlation id.
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Builder method: add wire flags.
    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Builder method: push a routing hop.
    pub fn with_route(mut self, hop: impl Into<String>) -> Self {
        self.routes.push(hop.into());
        self
    }

    /// True if `flag` is set on this message.
    pub fn has_flag(&self, flag: MessageFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Push a hop onto the routing stack.
    pub fn push_route(&mut self, hop: impl Into<String>) {
        self.routes.push(hop.into());
    }

    /// Pop the most recently pushed hop, if any.
    pub fn pop_route(&mut self) -> Option<String> {
        self.routes.pop()
    }

    /// The most recently pushed hop, if any.
    pub fn route_top(&self) -> Option<&str> {
        self.routes.last().map(String::as_str)
    }

    /// The first hop ever pushed: the identity of the message origin.
    pub fn route_origin(&self) -> Option<&str> {
        self.routes.first().map(String::as_str)
    }

    /// Build a success response to this request.
    ///
    /// Copies topic, routing stack, and correlation id so routers can walk
    /// the response back to the origin. Credentials default to unknown and
    /// are stamped by the sending connection.
    pub fn respond(&self) -> Message {
        Message {
            msg_type: MessageType::Response,
            topic: self.topic.clone(),
            payload: None,
            errnum: 0,
            routes: self.routes.clone(),
            cred: Credentials::default(),
            correlation_id: self.correlation_id,
            flags: MessageFlags::empty(),
        }
    }

    /// Build an error response to this request.
    pub fn respond_error(&self, errnum: i32) -> Message {
        let mut msg = self.respond();
        msg.errnum = errnum;
        msg
    }

    /// Deserialize the payload into `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let value = self.payload.clone().unwrap_or(Value::Null);
        serde_json::from_value(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::RoleMask;

    #[test]
    fn test_request_defaults() {
        let msg = Message::request("kvs.get");
        assert_eq!(msg.msg_type, MessageType::Request);
        assert_eq!(msg.topic, "kvs.get");
        assert!(msg.payload.is_none());
        assert_eq!(msg.errnum, 0);
        assert!(msg.routes.is_empty());
        assert!(msg.correlation_id.is_none());
        assert!(msg.flags.is_empty());
    }

    #[test]
    fn test_type_wire_values() {
        assert_eq!(MessageType::Request as u32, 1);
        assert_eq!(MessageType::Response as u32, 2);
        assert_eq!(MessageType::Event as u32, 4);
        assert_eq!(MessageType::Control as u32, 8);
    }

    #[test]
    fn test_type_mask_roundtrip() {
        assert_eq!(MessageType::Event.mask(), TypeMask::EVENT);
        assert!(TypeMask::all().contains(MessageType::Control.mask()));
    }

    #[test]
    fn test_route_stack_order() {
        let mut msg = Message::request("a.b");
        msg.push_route("first");
        msg.push_route("second");

        assert_eq!(msg.route_origin(), Some("first"));
        assert_eq!(msg.route_top(), Some("second"));
        assert_eq!(msg.pop_route().as_deref(), Some("second"));
        assert_eq!(msg.pop_route().as_deref(), Some("first"));
        assert_eq!(msg.pop_route(), None);
    }

    #[test]
    fn test_respond_copies_routing_context() {
        let id = Uuid::new_v4();
        let req = Message::request("svc.op")
            .with_route("client-1")
            .with_route("router-1")
            .with_correlation_id(id);

        let rep = req.respond();
        assert_eq!(rep.msg_type, MessageType::Response);
        assert_eq!(rep.topic, "svc.op");
        assert_eq!(rep.routes, vec!["client-1", "router-1"]);
        assert_eq!(rep.correlation_id, Some(id));
        assert_eq!(rep.errnum, 0);
    }

    #[test]
    fn test_respond_error_sets_errnum() {
        let req = Message::request("svc.op");
        let rep = req.respond_error(crate::util::errnum::ENOSYS);
        assert_eq!(rep.errnum, crate::util::errnum::ENOSYS);
    }

    #[test]
    fn test_flags_builder() {
        let msg = Message::request("m.shutdown").with_flags(MessageFlags::NO_RESPONSE);
        assert!(msg.has_flag(MessageFlags::NO_RESPONSE));
    }

    #[test]
    fn test_payload_roundtrip() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct P {
            n: i32,
        }

        let msg = Message::request("x").with_payload(serde_json::json!({"n": 7}));
        let p: P = msg.payload_as().unwrap();
        assert_eq!(p, P { n: 7 });
    }

    #[test]
    fn test_credentials_builder() {
        let cred = Credentials {
            userid: 1000,
            rolemask: RoleMask::USER,
        };
        let msg = Message::event("heartbeat").with_credentials(cred);
        assert_eq!(msg.cred, cred);
    }
}
