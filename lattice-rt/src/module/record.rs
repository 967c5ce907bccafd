// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

// Layer 3: Internal module imports
use super::disconnect::{DisconnectSendFn, DisconnectTracker};
use super::error::ModuleError;
use super::plugin::{self, ModuleEntry, ModuleImage};
use super::runtime;
use super::status::{ModuleStatus, MODULE_STATUS_TOPIC};
use crate::config::{AttrCache, ConfigSnapshot};
use crate::endpoint::{Endpoint, EndpointError, EndpointReceiver, EndpointSender, ModuleEnd};
use crate::message::{Credentials, Message, MessageFlags, MessageType, RoleMask};
use crate::util::ModuleId;

/// Callback fired on every lifecycle transition, with the previous status.
pub type StatusCallback = Box<dyn Fn(&Module, ModuleStatus) + Send + Sync>;

/// Callback fired for each message a module delivers to the broker, after
/// routing normalization and credential repair.
pub type PollerCallback = Box<dyn Fn(&Arc<Module>, Message) + Send + Sync>;

/// Broker-side record of one hosted module.
///
/// Owns the loaded plugin image, the broker side of the endpoint, the worker
/// thread, credential defaults, the topic-prefix subscription list, the
/// pending insmod/rmmod request queues, lifecycle status, and the disconnect
/// tracker. Records are `Arc`-shared between the host table, the reactor
/// watcher, and the worker thread; callbacks installed on the record must
/// hold non-owning context (the host resolves records through its table).
pub struct Module {
    uuid: ModuleId,
    uuid_str: String,
    parent_uuid: String,
    name: String,
    path: PathBuf,
    path_key: String,
    rank: u32,
    args: Vec<String>,
    conf: ConfigSnapshot,
    attrs: Arc<AttrCache>,
    cred: Credentials,
    image: ModuleImage,
    inner: Mutex<ModuleInner>,
    status_cb: RwLock<Option<StatusCallback>>,
    poller_cb: RwLock<Option<PollerCallback>>,
}

struct ModuleInner {
    status: ModuleStatus,
    errnum: i32,
    muted: bool,
    lastseen: Option<DateTime<Utc>>,
    subs: Vec<String>,
    rmmod: VecDeque<Message>,
    insmod: Option<Message>,
    disconnect: DisconnectTracker,
    /// Broker-to-module direction; dropping it unblocks the worker.
    sender: Option<EndpointSender>,
    /// Module-to-broker direction; taken by the reactor watcher at start.
    receiver: Option<EndpointReceiver>,
    /// Handed to the worker thread at start.
    module_end: Option<ModuleEnd>,
    thread: Option<thread::JoinHandle<()>>,
    watcher: Option<tokio::task::JoinHandle<()>>,
}

impl Module {
    /// Load a module image from `path` and build its record.
    ///
    /// Resolves the fixed-name entry symbol, derives the canonical name from
    /// the path when `name` is not supplied, checks the optional legacy name
    /// symbol against the canonical name, allocates the routing uuid, and
    /// opens the broker side of the endpoint. Fails with *not found* when
    /// the image cannot be loaded and *invalid argument* when the entry
    /// point or legacy name check fails; on failure everything acquired so
    /// far is released.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        parent_uuid: impl Into<String>,
        name: Option<&str>,
        path: impl AsRef<Path>,
        rank: u32,
        conf: ConfigSnapshot,
        attrs: Arc<AttrCache>,
        args: Vec<String>,
    ) -> Result<Arc<Self>, ModuleError> {
        let path = path.as_ref();
        let (image, legacy_name) = ModuleImage::load(path)?;
        let name = match name {
            Some(n) => n.to_string(),
            None => plugin::name_from_path(path).ok_or_else(|| {
                ModuleError::InvalidArgument(format!(
                    "cannot derive module name from {}",
                    path.display()
                ))
            })?,
        };
        // Compare against the resolved canonical name, whether it was
        // supplied or derived from the path.
        if let Some(legacy) = legacy_name {
            if legacy != name {
                return Err(ModuleError::InvalidArgument(format!(
                    "module_name {legacy} != name {name}"
                )));
            }
        }
        Ok(Self::build(
            parent_uuid.into(),
            name,
            path.to_path_buf(),
            image,
            rank,
            conf,
            attrs,
            args,
        ))
    }

    /// Build a record around a built-in (compiled-in) entry point.
    #[allow(clippy::too_many_arguments)]
    pub fn create_native(
        parent_uuid: impl Into<String>,
        name: &str,
        entry: ModuleEntry,
        rank: u32,
        conf: ConfigSnapshot,
        attrs: Arc<AttrCache>,
        args: Vec<String>,
    ) -> Result<Arc<Self>, ModuleError> {
        if name.is_empty() {
            return Err(ModuleError::InvalidArgument(
                "built-in module requires a name".to_string(),
            ));
        }
        let path = PathBuf::from(format!("builtin://{name}"));
        Ok(Self::build(
            parent_uuid.into(),
            name.to_string(),
            path,
            ModuleImage::native(entry),
            rank,
            conf,
            attrs,
            args,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        parent_uuid: String,
        name: String,
        path: PathBuf,
        image: ModuleImage,
        rank: u32,
        conf: ConfigSnapshot,
        attrs: Arc<AttrCache>,
        args: Vec<String>,
    ) -> Arc<Self> {
        let uuid = ModuleId::new();
        let (broker_end, module_end) = Endpoint::pair();
        let (sender, receiver) = broker_end.split();
        Arc::new(Self {
            uuid,
            uuid_str: uuid.to_string(),
            parent_uuid,
            name,
            path_key: path.display().to_string(),
            path,
            rank,
            args,
            conf,
            attrs,
            cred: Credentials::instance_owner(),
            image,
            inner: Mutex::new(ModuleInner {
                status: ModuleStatus::Init,
                errnum: 0,
                muted: false,
                lastseen: None,
                subs: Vec::new(),
                rmmod: VecDeque::new(),
                insmod: None,
                disconnect: DisconnectTracker::new(),
                sender: Some(sender),
                receiver: Some(receiver),
                module_end: Some(module_end),
                thread: None,
                watcher: None,
            }),
            status_cb: RwLock::new(None),
            poller_cb: RwLock::new(None),
        })
    }

    /// Canonical module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image path (`builtin://<name>` for built-in modules).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stable string form of the path, the host's primary lookup key.
    pub fn path_key(&self) -> &str {
        &self.path_key
    }

    /// Routing identity (uuid string form).
    pub fn uuid_str(&self) -> &str {
        &self.uuid_str
    }

    /// Routing identity as a typed id.
    pub fn uuid(&self) -> ModuleId {
        self.uuid
    }

    /// Uuid of the hosting broker.
    pub fn parent_uuid(&self) -> &str {
        &self.parent_uuid
    }

    /// Node rank of the hosting broker.
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Module argument vector.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Connection credential defaults (instance owner).
    pub fn credentials(&self) -> Credentials {
        self.cred
    }

    pub(crate) fn image(&self) -> &ModuleImage {
        &self.image
    }

    pub(crate) fn config_snapshot(&self) -> ConfigSnapshot {
        self.conf.clone()
    }

    pub(crate) fn attr_cache(&self) -> Arc<AttrCache> {
        Arc::clone(&self.attrs)
    }

    pub(crate) fn take_module_end(&self) -> Option<ModuleEnd> {
        self.inner.lock().module_end.take()
    }

    pub(crate) fn take_receiver(&self) -> Option<EndpointReceiver> {
        self.inner.lock().receiver.take()
    }

    /// Install the status-change callback. Fired on every transition with
    /// the previous status.
    pub fn set_status_cb(&self, cb: StatusCallback) {
        *self.status_cb.write() = Some(cb);
    }

    /// Install the poller callback fired for every message the module
    /// delivers to the broker.
    pub fn set_poller_cb(&self, cb: PollerCallback) {
        *self.poller_cb.write() = Some(cb);
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ModuleStatus {
        self.inner.lock().status
    }

    /// Transition the lifecycle status and fire the status callback.
    ///
    /// Transitions back into `Init` and out of `Exited` are forbidden.
    pub fn set_status(&self, new_status: ModuleStatus) {
        let prev = {
            let mut inner = self.inner.lock();
            debug_assert!(
                new_status != ModuleStatus::Init,
                "illegal transition into INIT"
            );
            debug_assert!(
                inner.status != ModuleStatus::Exited,
                "illegal transition out of EXITED"
            );
            let prev = inner.status;
            inner.status = new_status;
            prev
        };
        if let Some(cb) = self.status_cb.read().as_ref() {
            cb(self, prev);
        }
    }

    /// Saved terminal error number.
    pub fn errnum(&self) -> i32 {
        self.inner.lock().errnum
    }

    /// Save the terminal error number published with EXITED.
    pub fn set_errnum(&self, errnum: i32) {
        self.inner.lock().errnum = errnum;
    }

    /// Timestamp of the last readable event on the broker endpoint.
    pub fn lastseen(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().lastseen
    }

    pub(crate) fn note_seen(&self) {
        self.inner.lock().lastseen = Some(Utc::now());
    }

    /// Mute the module: from here on only the module-status reply may be
    /// sent to it. Irreversible.
    pub fn mute(&self) {
        self.inner.lock().muted = true;
    }

    /// True once the module has been muted.
    pub fn is_muted(&self) -> bool {
        self.inner.lock().muted
    }

    /// Add `topic` to the subscription list.
    ///
    /// The list is a multiset: duplicate subscriptions stack and are removed
    /// one at a time.
    pub fn subscribe(&self, topic: impl Into<String>) {
        self.inner.lock().subs.push(topic.into());
    }

    /// Remove the first exact match of `topic` from the subscription list.
    pub fn unsubscribe(&self, topic: &str) {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.subs.iter().position(|s| s == topic) {
            inner.subs.remove(pos);
        }
    }

    /// Snapshot of the subscription list.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.lock().subs.clone()
    }

    /// Queue a remove-module request to be answered once the module
    /// terminates. FIFO.
    pub fn push_rmmod(&self, msg: Message) {
        self.inner.lock().rmmod.push_back(msg);
    }

    /// Pop the oldest queued remove-module request.
    pub fn pop_rmmod(&self) -> Option<Message> {
        self.inner.lock().rmmod.pop_front()
    }

    /// Hold the pending insmod request. There can be only one: a second
    /// push replaces (and drops) the first.
    pub fn push_insmod(&self, msg: Message) {
        self.inner.lock().insmod = Some(msg);
    }

    /// Take the pending insmod request, if any.
    pub fn pop_insmod(&self) -> Option<Message> {
        self.inner.lock().insmod.take()
    }

    /// Record an outbound request in the disconnect tracker.
    pub fn disconnect_arm(&self, msg: &Message, send: DisconnectSendFn) {
        self.inner.lock().disconnect.arm(msg, send);
    }

    /// Number of (service, sender) tuples armed for disconnect.
    pub fn disconnects_armed(&self) -> usize {
        self.inner.lock().disconnect.armed()
    }

    /// Read one message from the broker end and normalize it.
    ///
    /// Responses lose their last routing hop (this module was the responder;
    /// the broker does not need it). Requests and events gain this module's
    /// uuid so the reply path can find it. Unknown credentials are repaired
    /// from the connection defaults; only the OWNER-roled intra-broker
    /// connection may stamp credentials this way.
    ///
    /// Returns `Ok(None)` once the module end is closed and drained.
    pub async fn recvmsg(
        &self,
        receiver: &mut EndpointReceiver,
    ) -> Result<Option<Message>, ModuleError> {
        let Some(mut msg) = receiver.recv().await else {
            return Ok(None);
        };
        match msg.msg_type {
            MessageType::Response => {
                msg.pop_route().ok_or_else(|| {
                    ModuleError::MalformedMessage("response without routing hop".to_string())
                })?;
            }
            MessageType::Request | MessageType::Event => {
                msg.push_route(self.uuid_str.clone());
            }
            MessageType::Control => {}
        }
        debug_assert!(self.cred.has_role(RoleMask::OWNER));
        if msg.cred.userid_is_unknown() {
            msg.cred.userid = self.cred.userid;
        }
        if msg.cred.rolemask.is_empty() {
            msg.cred.rolemask = self.cred.rolemask;
        }
        Ok(Some(msg))
    }

    /// Send a message into the module.
    ///
    /// While muted, only responses to `broker.module-status` pass; anything
    /// else fails with *unsupported*. Requests gain the broker's uuid on the
    /// routing stack (client-style routed send); responses lose their last
    /// hop (router-style send); other types pass untouched.
    pub fn sendmsg(&self, msg: &Message) -> Result<(), ModuleError> {
        let inner = self.inner.lock();
        if inner.muted
            && (msg.msg_type != MessageType::Response || msg.topic != MODULE_STATUS_TOPIC)
        {
            return Err(ModuleError::Unsupported {
                topic: msg.topic.clone(),
            });
        }
        let sender = inner
            .sender
            .as_ref()
            .ok_or(ModuleError::Endpoint(EndpointError::Closed))?;

        let mut cpy = msg.clone();
        match cpy.msg_type {
            MessageType::Request => {
                cpy.push_route(self.parent_uuid.clone());
                if cpy.cred.userid_is_unknown() {
                    cpy.cred = self.cred;
                }
            }
            MessageType::Response => {
                cpy.pop_route().ok_or_else(|| {
                    ModuleError::MalformedMessage("response without routing hop".to_string())
                })?;
            }
            MessageType::Event | MessageType::Control => {}
        }
        sender.send(cpy)?;
        Ok(())
    }

    /// Deliver an event if any subscription is a prefix of its topic;
    /// otherwise drop it silently.
    pub fn event_cast(&self, event: &Message) -> Result<(), ModuleError> {
        let matched = {
            let inner = self.inner.lock();
            inner.subs.iter().any(|s| event.topic.starts_with(s.as_str()))
        };
        if matched {
            self.sendmsg(event)?;
        }
        Ok(())
    }

    /// Arm the reactor watcher, then spawn the worker thread.
    ///
    /// Must be called from within the broker's runtime. If the thread cannot
    /// be spawned the watcher is detached cleanly and the error returned.
    pub fn start(self: &Arc<Self>) -> Result<(), ModuleError> {
        let mut receiver = self.take_receiver().ok_or_else(|| {
            ModuleError::InvalidArgument(format!("module {} already started", self.name))
        })?;

        let record = Arc::clone(self);
        let watcher = tokio::spawn(async move {
            loop {
                match record.recvmsg(&mut receiver).await {
                    Ok(Some(msg)) => {
                        record.note_seen();
                        if let Some(cb) = record.poller_cb.read().as_ref() {
                            cb(&record, msg);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(module = %record.name, error = %e, "dropping malformed message");
                    }
                }
            }
        });

        let worker = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("module-{}", self.name))
            .spawn(move || runtime::run(worker));

        let mut inner = self.inner.lock();
        match spawned {
            Ok(handle) => {
                inner.thread = Some(handle);
                inner.watcher = Some(watcher);
                Ok(())
            }
            Err(e) => {
                watcher.abort();
                Err(ModuleError::ThreadSpawn(e))
            }
        }
    }

    /// Ask the module to shut down: fire-and-forget `<name>.shutdown`.
    pub fn stop(&self) -> Result<(), ModuleError> {
        let msg =
            Message::request(format!("{}.shutdown", self.name)).with_flags(MessageFlags::NO_RESPONSE);
        self.sendmsg(&msg)
    }

    /// Request worker termination by closing the broker-to-module channel;
    /// the worker's next blocking receive fails and its entry point unwinds.
    /// Absence of a live thread is not an error.
    pub fn cancel(&self) {
        self.inner.lock().sender.take();
    }

    /// Tear the record down.
    ///
    /// Order matters: join the worker; if the record never reached `Exited`,
    /// force that transition so the status callback runs and service-name
    /// bindings are removed before anything else drops references to the
    /// record; then sweep disconnects, stop the watcher, close the endpoint,
    /// and drain the request queues. The plugin image is released when the
    /// last reference to the record drops.
    pub fn destroy(&self) {
        let (thread, sender) = {
            let mut inner = self.inner.lock();
            (inner.thread.take(), inner.sender.take())
        };
        // Closing the broker-to-module channel unblocks a worker that is
        // still parked on its handle.
        drop(sender);
        if let Some(thread) = thread {
            if thread.join().is_err() {
                warn!(module = %self.name, "module worker panicked");
            }
        }
        if self.status() != ModuleStatus::Exited {
            self.set_status(ModuleStatus::Exited);
        }

        // Send disconnect messages to services used by this module.
        let mut disconnect = {
            let mut inner = self.inner.lock();
            std::mem::take(&mut inner.disconnect)
        };
        disconnect.fire();

        let mut inner = self.inner.lock();
        if let Some(watcher) = inner.watcher.take() {
            watcher.abort();
        }
        inner.receiver = None;
        inner.module_end = None;
        inner.rmmod.clear();
        inner.insmod = None;
        inner.subs.clear();
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("uuid", &self.uuid_str)
            .field("path", &self.path)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::util::errnum;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop_entry(
        _h: &mut crate::handle::ModuleHandle,
        _args: &[String],
    ) -> Result<(), plugin::ModuleMainError> {
        Ok(())
    }

    fn test_module() -> Arc<Module> {
        Module::create_native(
            "parent-uuid",
            "testmod",
            noop_entry,
            0,
            ConfigSnapshot::default(),
            Arc::new(AttrCache::new()),
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_native_record_shape() {
        let m = test_module();
        assert_eq!(m.name(), "testmod");
        assert_eq!(m.path_key(), "builtin://testmod");
        assert_eq!(m.status(), ModuleStatus::Init);
        assert_eq!(m.errnum(), 0);
        assert!(!m.is_muted());
        assert!(m.lastseen().is_none());
        assert!(m.credentials().has_role(RoleMask::OWNER));
        assert_eq!(m.uuid().to_string(), m.uuid_str());
    }

    #[test]
    fn test_create_native_requires_name() {
        let result = Module::create_native(
            "p",
            "",
            noop_entry,
            0,
            ConfigSnapshot::default(),
            Arc::new(AttrCache::new()),
            Vec::new(),
        );
        assert!(matches!(result, Err(ModuleError::InvalidArgument(_))));
    }

    #[test]
    fn test_sendmsg_request_pushes_parent_uuid() {
        let m = test_module();
        let mut end = m.take_module_end().unwrap();

        m.sendmsg(&Message::request("kvs.get")).unwrap();
        let got = end.receiver.try_recv().unwrap();
        assert_eq!(got.route_top(), Some("parent-uuid"));
        assert!(!got.cred.userid_is_unknown());
    }

    #[test]
    fn test_sendmsg_response_pops_route() {
        let m = test_module();
        let mut end = m.take_module_end().unwrap();

        let rep = Message::response("kvs.get")
            .with_route("client")
            .with_route(m.uuid_str().to_string());
        m.sendmsg(&rep).unwrap();
        let got = end.receiver.try_recv().unwrap();
        assert_eq!(got.routes, vec!["client"]);
    }

    #[test]
    fn test_sendmsg_response_without_route_is_malformed() {
        let m = test_module();
        let rep = Message::response("kvs.get");
        assert!(matches!(
            m.sendmsg(&rep),
            Err(ModuleError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_muted_accepts_only_status_reply() {
        let m = test_module();
        m.mute();
        assert!(m.is_muted());

        let err = m.sendmsg(&Message::request("ping")).unwrap_err();
        assert!(matches!(err, ModuleError::Unsupported { .. }));
        assert_eq!(err.errnum(), errnum::ENOSYS);

        let err = m.sendmsg(&Message::event("x.y")).unwrap_err();
        assert!(matches!(err, ModuleError::Unsupported { .. }));

        // Response to a different topic is refused too.
        let rep = Message::response("other.topic").with_route("hop");
        assert!(matches!(
            m.sendmsg(&rep),
            Err(ModuleError::Unsupported { .. })
        ));

        // The module-status reply passes.
        let rep = Message::response(MODULE_STATUS_TOPIC).with_route("hop");
        m.sendmsg(&rep).unwrap();
    }

    #[tokio::test]
    async fn test_recvmsg_normalizes_by_type() {
        let m = test_module();
        let end = m.take_module_end().unwrap();
        let mut rx = m.take_receiver().unwrap();

        // Request gains this module's uuid.
        end.sender.send(Message::request("kvs.get")).unwrap();
        let got = m.recvmsg(&mut rx).await.unwrap().unwrap();
        assert_eq!(got.route_top(), Some(m.uuid_str()));

        // Response loses its last hop.
        end.sender
            .send(Message::response("a.b").with_route("keep").with_route("drop"))
            .unwrap();
        let got = m.recvmsg(&mut rx).await.unwrap().unwrap();
        assert_eq!(got.routes, vec!["keep"]);

        // Control is untouched.
        end.sender.send(Message::control("disconnect")).unwrap();
        let got = m.recvmsg(&mut rx).await.unwrap().unwrap();
        assert!(got.routes.is_empty());
    }

    #[tokio::test]
    async fn test_recvmsg_repairs_credentials() {
        let m = test_module();
        let end = m.take_module_end().unwrap();
        let mut rx = m.take_receiver().unwrap();

        end.sender
            .send(Message::request("kvs.get").with_credentials(Credentials::unknown()))
            .unwrap();
        let got = m.recvmsg(&mut rx).await.unwrap().unwrap();
        assert_eq!(got.cred.userid, m.credentials().userid);
        assert_eq!(got.cred.rolemask, m.credentials().rolemask);

        // Explicit credentials survive: the module may send on behalf of
        // other users.
        let cred = Credentials {
            userid: 1234,
            rolemask: RoleMask::USER,
        };
        end.sender
            .send(Message::request("kvs.get").with_credentials(cred))
            .unwrap();
        let got = m.recvmsg(&mut rx).await.unwrap().unwrap();
        assert_eq!(got.cred, cred);
    }

    #[tokio::test]
    async fn test_recvmsg_closed_end_returns_none() {
        let m = test_module();
        let mut rx = m.take_receiver().unwrap();
        drop(m.take_module_end());

        assert!(m.recvmsg(&mut rx).await.unwrap().is_none());
    }

    #[test]
    fn test_event_cast_prefix_match() {
        let m = test_module();
        let mut end = m.take_module_end().unwrap();

        m.subscribe("x.");
        m.event_cast(&Message::event("x.y")).unwrap();
        m.event_cast(&Message::event("y.x")).unwrap();

        let got = end.receiver.try_recv().unwrap();
        assert_eq!(got.topic, "x.y");
        assert!(end.receiver.try_recv().is_none()); // y.x dropped silently
    }

    #[test]
    fn test_subscribe_unsubscribe_roundtrip() {
        let m = test_module();
        m.subscribe("a.");
        m.subscribe("b.");
        m.subscribe("a."); // multiset: duplicates stack

        m.unsubscribe("a.");
        assert_eq!(m.subscriptions(), vec!["b.", "a."]);
        m.unsubscribe("a.");
        assert_eq!(m.subscriptions(), vec!["b."]);
        m.unsubscribe("missing"); // no-op
        assert_eq!(m.subscriptions(), vec!["b."]);
    }

    #[test]
    fn test_rmmod_queue_is_fifo() {
        let m = test_module();
        m.push_rmmod(Message::request("rmmod.1"));
        m.push_rmmod(Message::request("rmmod.2"));

        assert_eq!(m.pop_rmmod().map(|r| r.topic), Some("rmmod.1".into()));
        assert_eq!(m.pop_rmmod().map(|r| r.topic), Some("rmmod.2".into()));
        assert!(m.pop_rmmod().is_none());
    }

    #[test]
    fn test_insmod_slot_holds_one() {
        let m = test_module();
        m.push_insmod(Message::request("insmod.1"));
        m.push_insmod(Message::request("insmod.2"));

        assert_eq!(m.pop_insmod().map(|r| r.topic), Some("insmod.2".into()));
        assert!(m.pop_insmod().is_none());
    }

    #[test]
    fn test_status_callback_fires_with_previous() {
        let m = test_module();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        m.set_status_cb(Box::new(move |module, prev| {
            sink.lock().push((prev, module.status()));
        }));

        m.set_status(ModuleStatus::Running);
        m.set_status(ModuleStatus::Finalizing);
        m.set_status(ModuleStatus::Exited);

        assert_eq!(
            *seen.lock(),
            vec![
                (ModuleStatus::Init, ModuleStatus::Running),
                (ModuleStatus::Running, ModuleStatus::Finalizing),
                (ModuleStatus::Finalizing, ModuleStatus::Exited),
            ]
        );
    }

    #[test]
    #[should_panic(expected = "illegal transition")]
    #[cfg(debug_assertions)]
    fn test_transition_into_init_asserts() {
        let m = test_module();
        m.set_status(ModuleStatus::Init);
    }

    #[test]
    #[should_panic(expected = "illegal transition")]
    #[cfg(debug_assertions)]
    fn test_transition_out_of_exited_asserts() {
        let m = test_module();
        m.set_status(ModuleStatus::Exited);
        m.set_status(ModuleStatus::Running);
    }

    #[test]
    fn test_cancel_without_thread_is_ok() {
        let m = test_module();
        m.cancel();
        // Endpoint now closed for sends.
        assert!(matches!(
            m.sendmsg(&Message::request("x")),
            Err(ModuleError::Endpoint(EndpointError::Closed))
        ));
    }

    #[tokio::test]
    async fn test_destroy_forces_exited_and_fires_callback_once() {
        let m = test_module();
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        m.set_status_cb(Box::new(move |module, _prev| {
            if module.status() == ModuleStatus::Exited {
                sink.fetch_add(1, Ordering::SeqCst);
            }
        }));

        m.destroy();
        assert_eq!(m.status(), ModuleStatus::Exited);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // destroy() again must not re-fire the terminal transition.
        m.destroy();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    proptest! {
        /// event_cast delivers iff some subscription is a prefix of the
        /// event topic.
        #[test]
        fn prop_event_cast_delivery(
            subs in proptest::collection::vec("[a-c]{0,3}", 0..4),
            topic in "[a-c]{0,4}",
        ) {
            let m = test_module();
            let mut end = m.take_module_end().unwrap();
            for s in &subs {
                m.subscribe(s.clone());
            }

            m.event_cast(&Message::event(topic.clone())).unwrap();
            let delivered = end.receiver.try_recv().is_some();
            let expected = subs.iter().any(|s| topic.starts_with(s.as_str()));
            prop_assert_eq!(delivered, expected);
        }

        /// subscribe then unsubscribe restores the subscription list.
        #[test]
        fn prop_subscribe_unsubscribe_restores(
            base in proptest::collection::vec("[a-c]{1,3}", 0..4),
            topic in "[a-c]{1,3}",
        ) {
            let m = test_module();
            for s in &base {
                m.subscribe(s.clone());
            }
            let before = m.subscriptions();
            m.subscribe(topic.clone());
            m.unsubscribe(&topic);
            prop_assert_eq!(m.subscriptions(), before);
        }
    }
}
