// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

// Layer 3: Internal module imports
use super::error::HandleError;
use crate::config::{AttrCache, ConfigSnapshot};
use crate::endpoint::{EndpointReceiver, EndpointSender, ModuleEnd};
use crate::message::{Credentials, Message, MessageFlags, MessageType};

/// Parameters for opening a handle on the module end of an endpoint.
#[derive(Debug, Clone)]
pub struct HandleParams {
    /// Canonical module name (used for built-in service topics).
    pub name: String,
    /// Module routing identity (uuid string form).
    pub uuid: String,
    /// Node rank of the hosting broker.
    pub rank: u32,
    /// Immutable configuration snapshot.
    pub conf: ConfigSnapshot,
    /// Primed attribute cache.
    pub attrs: Arc<AttrCache>,
}

/// Send/receive counters reported by `<name>.stats-get`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleStats {
    /// Messages sent through this handle.
    pub tx_count: u64,
    /// Messages received through this handle.
    pub rx_count: u64,
}

/// Module-side connection to the broker.
///
/// Owned by the worker thread; never shared. Receives block the calling
/// thread, which is the worker's whole scheduling model: the only suspension
/// points a module has are the send/receive primitives and the synchronous
/// RPCs built on them.
pub struct ModuleHandle {
    name: String,
    uuid: String,
    uri: String,
    rank: u32,
    conf: ConfigSnapshot,
    attrs: Arc<AttrCache>,
    cred: Credentials,
    sender: EndpointSender,
    receiver: EndpointReceiver,
    /// Messages set aside while an RPC waited for its response.
    backlog: VecDeque<Message>,
    stats: HandleStats,
    ping_topic: String,
    stats_topic: String,
    shutdown_topic: String,
}

impl ModuleHandle {
    /// Open a handle over the module end of an endpoint.
    ///
    /// The URI is derived from the module uuid, mirroring how the broker end
    /// was bound.
    pub fn open(end: ModuleEnd, params: HandleParams) -> Self {
        let (sender, receiver) = end.split();
        Self {
            uri: format!("inproc://{}", params.uuid),
            ping_topic: format!("{}.ping", params.name),
            stats_topic: format!("{}.stats-get", params.name),
            shutdown_topic: format!("{}.shutdown", params.name),
            name: params.name,
            uuid: params.uuid,
            rank: params.rank,
            conf: params.conf,
            attrs: params.attrs,
            cred: Credentials::instance_owner(),
            sender,
            receiver,
            backlog: VecDeque::new(),
            stats: HandleStats::default(),
        }
    }

    /// Canonical module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Routing identity of this module.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Connection URI this handle was opened under.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Node rank of the hosting broker.
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// The broker's configuration snapshot. Always succeeds.
    pub fn config(&self) -> &ConfigSnapshot {
        &self.conf
    }

    /// Locally cached broker attribute lookup.
    pub fn attr_get(&self, name: &str) -> Option<&str> {
        self.attrs.get(name)
    }

    /// Send/receive counters.
    pub fn stats(&self) -> HandleStats {
        self.stats
    }

    /// Send a message to the broker.
    ///
    /// Messages with unknown credentials are stamped with the connection
    /// credentials (instance owner) on the way out.
    pub fn send(&mut self, mut msg: Message) -> Result<(), HandleError> {
        if msg.cred.userid_is_unknown() {
            msg.cred = self.cred;
        }
        self.sender.send(msg)?;
        self.stats.tx_count += 1;
        Ok(())
    }

    /// Receive the next message addressed to this module, blocking.
    ///
    /// Built-in services are handled here: `<name>.ping` and
    /// `<name>.stats-get` requests are answered internally and never
    /// surface; a `<name>.shutdown` request surfaces as
    /// [`HandleError::Shutdown`], the signal for the entry point to unwind.
    pub fn recv(&mut self) -> Result<Message, HandleError> {
        loop {
            let msg = self
                .next_message()
                .ok_or(HandleError::Disconnected)?;
            if let Some(msg) = self.dispatch_builtin(msg)? {
                return Ok(msg);
            }
        }
    }

    /// Non-blocking receive of the next queued request, for the
    /// post-shutdown drain. Non-request traffic is discarded.
    pub fn try_recv_request(&mut self) -> Option<Message> {
        while let Some(msg) = self.try_next_message() {
            if msg.msg_type == MessageType::Request {
                return Some(msg);
            }
        }
        None
    }

    /// Respond to `req` with an optional payload.
    ///
    /// A no-op when the request was flagged `NO_RESPONSE`.
    pub fn respond(&mut self, req: &Message, payload: Option<Value>) -> Result<(), HandleError> {
        if req.has_flag(MessageFlags::NO_RESPONSE) {
            return Ok(());
        }
        let mut rep = req.respond();
        rep.payload = payload;
        self.send(rep)
    }

    /// Respond to `req` with an error number.
    pub fn respond_error(&mut self, req: &Message, errnum: i32) -> Result<(), HandleError> {
        if req.has_flag(MessageFlags::NO_RESPONSE) {
            return Ok(());
        }
        self.send(req.respond_error(errnum))
    }

    /// Synchronous RPC: send a request and block until its response arrives.
    ///
    /// Unrelated traffic that arrives while waiting is set aside and
    /// delivered by later receives in order. A response with a non-zero
    /// error number maps to [`HandleError::Rpc`].
    pub fn rpc(&mut self, topic: &str, payload: Option<Value>) -> Result<Message, HandleError> {
        let correlation_id = Uuid::new_v4();
        let mut req = Message::request(topic).with_correlation_id(correlation_id);
        req.payload = payload;
        self.send(req)?;

        loop {
            // Wait on the wire directly; the backlog can't contain a
            // response to a request we only just sent.
            let msg = self
                .receiver
                .blocking_recv()
                .ok_or(HandleError::Disconnected)?;
            self.stats.rx_count += 1;
            if msg.msg_type == MessageType::Response && msg.correlation_id == Some(correlation_id)
            {
                if msg.errnum != 0 {
                    return Err(HandleError::Rpc {
                        topic: topic.to_string(),
                        errnum: msg.errnum,
                    });
                }
                return Ok(msg);
            }
            self.backlog.push_back(msg);
        }
    }

    /// Fire-and-forget RPC: send a request flagged `NO_RESPONSE`.
    pub fn rpc_noresponse(&mut self, topic: &str, payload: Option<Value>) -> Result<(), HandleError> {
        let mut req = Message::request(topic).with_flags(MessageFlags::NO_RESPONSE);
        req.payload = payload;
        self.send(req)
    }

    /// Subscribe this module to events whose topic starts with `topic`.
    pub fn event_subscribe(&mut self, topic: &str) -> Result<(), HandleError> {
        self.rpc(
            "event.subscribe",
            Some(serde_json::json!({ "topic": topic })),
        )?;
        Ok(())
    }

    /// Remove one subscription added with [`ModuleHandle::event_subscribe`].
    pub fn event_unsubscribe(&mut self, topic: &str) -> Result<(), HandleError> {
        self.rpc(
            "event.unsubscribe",
            Some(serde_json::json!({ "topic": topic })),
        )?;
        Ok(())
    }

    fn next_message(&mut self) -> Option<Message> {
        if let Some(msg) = self.backlog.pop_front() {
            return Some(msg);
        }
        let msg = self.receiver.blocking_recv()?;
        self.stats.rx_count += 1;
        Some(msg)
    }

    fn try_next_message(&mut self) -> Option<Message> {
        if let Some(msg) = self.backlog.pop_front() {
            return Some(msg);
        }
        let msg = self.receiver.try_recv()?;
        self.stats.rx_count += 1;
        Some(msg)
    }

    /// Handle built-in service requests; `Ok(None)` means consumed.
    fn dispatch_builtin(&mut self, msg: Message) -> Result<Option<Message>, HandleError> {
        if msg.msg_type != MessageType::Request {
            return Ok(Some(msg));
        }
        if msg.topic == self.shutdown_topic {
            debug!(module = %self.name, "shutdown requested");
            return Err(HandleError::Shutdown);
        }
        if msg.topic == self.ping_topic {
            let payload = msg.payload.clone();
            self.respond(&msg, payload)?;
            return Ok(None);
        }
        if msg.topic == self.stats_topic {
            let payload = serde_json::to_value(self.stats)?;
            self.respond(&msg, Some(payload))?;
            return Ok(None);
        }
        Ok(Some(msg))
    }
}
