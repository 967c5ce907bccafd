// Layer 1: Standard library imports
use std::path::Path;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, trace, warn};

// Layer 3: Internal module imports
use super::error::ModuleError;
use super::plugin::ModuleEntry;
use super::record::Module;
use super::status::{ModuleStatus, ModuleStatusPayload, MODULE_STATUS_TOPIC};
use crate::config::{AttrCache, ConfigSnapshot};
use crate::message::{Message, MessageFlags, MessageType};
use crate::util::errnum;

/// Topic a module requests to add a topic-prefix event subscription.
pub const EVENT_SUBSCRIBE_TOPIC: &str = "event.subscribe";

/// Topic a module requests to drop one event subscription.
pub const EVENT_UNSUBSCRIBE_TOPIC: &str = "event.unsubscribe";

/// Messages from modules that are not host-internal are handed to this
/// callback, after normalization: the broker's router.
pub type ReceiverCallback = Box<dyn Fn(&Arc<Module>, Message) + Send + Sync>;

/// Host-level status-change notification, fired after the host's own
/// bookkeeping for the transition.
pub type HostStatusCallback = Box<dyn Fn(&Arc<Module>, ModuleStatus) + Send + Sync>;

/// Answers retained client requests (insmod/rmmod) with an error number.
pub type ResponderCallback = Box<dyn Fn(&Message, i32) + Send + Sync>;

/// Construction parameters for a [`ModuleHost`].
#[derive(Debug, Clone, Default)]
pub struct ModuleHostConfig {
    /// Routing uuid of the hosting broker, pushed on module requests.
    pub parent_uuid: String,
    /// Node rank of the hosting broker.
    pub rank: u32,
    /// Configuration snapshot handed to every module.
    pub conf: ConfigSnapshot,
    /// Attribute cache primed into every module handle.
    pub attrs: Arc<AttrCache>,
}

/// The broker-side collection of hosted modules.
///
/// Keyed by image path, with secondary lookups by name and by routing uuid;
/// every key is stable for the record's lifetime. The host wires a reactor
/// watcher per record, services the internal module-status and event
/// subscription RPCs, fans events out by topic-prefix match, and forwards
/// everything else to the broker's receiver callback.
///
/// Cheap to clone; clones share the module table.
#[derive(Clone)]
pub struct ModuleHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    parent_uuid: String,
    rank: u32,
    conf: ConfigSnapshot,
    attrs: Arc<AttrCache>,
    /// Primary table: image path -> record.
    modules: DashMap<String, Arc<Module>>,
    /// Secondary indices into `modules`.
    by_name: DashMap<String, String>,
    by_uuid: DashMap<String, String>,
    receiver_cb: RwLock<Option<ReceiverCallback>>,
    status_cb: RwLock<Option<HostStatusCallback>>,
    responder_cb: RwLock<Option<ResponderCallback>>,
}

#[derive(Deserialize)]
struct SubscribePayload {
    topic: String,
}

impl ModuleHost {
    /// Create an empty host.
    pub fn new(config: ModuleHostConfig) -> Self {
        Self {
            inner: Arc::new(HostInner {
                parent_uuid: config.parent_uuid,
                rank: config.rank,
                conf: config.conf,
                attrs: config.attrs,
                modules: DashMap::new(),
                by_name: DashMap::new(),
                by_uuid: DashMap::new(),
                receiver_cb: RwLock::new(None),
                status_cb: RwLock::new(None),
                responder_cb: RwLock::new(None),
            }),
        }
    }

    /// Install the broker's router for non-internal module traffic.
    pub fn set_receiver(&self, cb: ReceiverCallback) {
        *self.inner.receiver_cb.write() = Some(cb);
    }

    /// Install the broker's status-change callback.
    ///
    /// Fired after the host's own transition bookkeeping, and before
    /// teardown drops the record: on EXITED the broker must remove the
    /// module's service-name bindings here.
    pub fn set_status_callback(&self, cb: HostStatusCallback) {
        *self.inner.status_cb.write() = Some(cb);
    }

    /// Install the callback answering retained insmod/rmmod requests.
    pub fn set_responder(&self, cb: ResponderCallback) {
        *self.inner.responder_cb.write() = Some(cb);
    }

    /// Load a module image, register the record, and start its worker.
    pub fn load(
        &self,
        path: impl AsRef<Path>,
        name: Option<&str>,
        args: Vec<String>,
    ) -> Result<Arc<Module>, ModuleError> {
        let module = Module::create(
            self.inner.parent_uuid.clone(),
            name,
            path,
            self.inner.rank,
            self.inner.conf.clone(),
            Arc::clone(&self.inner.attrs),
            args,
        )?;
        self.register_and_start(module)
    }

    /// Register and start a built-in module.
    pub fn load_native(
        &self,
        name: &str,
        entry: ModuleEntry,
        args: Vec<String>,
    ) -> Result<Arc<Module>, ModuleError> {
        let module = Module::create_native(
            self.inner.parent_uuid.clone(),
            name,
            entry,
            self.inner.rank,
            self.inner.conf.clone(),
            Arc::clone(&self.inner.attrs),
            args,
        )?;
        self.register_and_start(module)
    }

    /// Number of hosted modules.
    pub fn count(&self) -> usize {
        self.inner.modules.len()
    }

    /// Look up a record by canonical name.
    pub fn module_by_name(&self, name: &str) -> Option<Arc<Module>> {
        let key = self.inner.by_name.get(name)?.clone();
        self.inner.modules.get(&key).map(|m| Arc::clone(&m))
    }

    /// Look up a record by routing uuid.
    pub fn module_by_uuid(&self, uuid: &str) -> Option<Arc<Module>> {
        self.inner.module_by_uuid(uuid)
    }

    /// Look up a record by image path.
    pub fn module_by_path(&self, path: &str) -> Option<Arc<Module>> {
        self.inner.modules.get(path).map(|m| Arc::clone(&m))
    }

    /// Snapshot of all hosted records.
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.inner
            .modules
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Deliver an event to every module whose subscription list
    /// prefix-matches its topic. Cross-module delivery order is
    /// unspecified.
    pub fn event_cast(&self, event: &Message) {
        for entry in self.inner.modules.iter() {
            if let Err(e) = entry.value().event_cast(event) {
                warn!(module = %entry.value().name(), error = %e, "event delivery failed");
            }
        }
    }

    /// Send the fire-and-forget shutdown request to a module.
    pub fn stop(&self, name: &str) -> Result<(), ModuleError> {
        let module = self
            .module_by_name(name)
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()))?;
        module.stop()
    }

    /// Request worker termination for a module (escalation after `stop`).
    pub fn cancel(&self, name: &str) -> Result<(), ModuleError> {
        let module = self
            .module_by_name(name)
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()))?;
        module.cancel();
        Ok(())
    }

    /// Tear down a module and unregister it.
    ///
    /// The record's destroy runs (and with it the forced EXITED transition
    /// and disconnect sweep) while the record is still resolvable through
    /// the host tables, so status callbacks can find it.
    pub fn destroy(&self, name: &str) -> Result<(), ModuleError> {
        let module = self
            .module_by_name(name)
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()))?;
        module.destroy();
        self.unregister(&module);
        Ok(())
    }

    /// Tear down every hosted module.
    pub fn destroy_all(&self) {
        for module in self.modules() {
            module.destroy();
            self.unregister(&module);
        }
    }

    fn register_and_start(&self, module: Arc<Module>) -> Result<Arc<Module>, ModuleError> {
        let inner = &self.inner;
        if inner.modules.contains_key(module.path_key()) {
            return Err(ModuleError::Exists(module.path_key().to_string()));
        }
        if inner.by_name.contains_key(module.name()) {
            return Err(ModuleError::Exists(module.name().to_string()));
        }

        // Callbacks hold a non-owning host reference; records are resolved
        // back through the table.
        let weak = Arc::downgrade(inner);
        module.set_poller_cb(Box::new(move |record, msg| {
            if let Some(host) = weak.upgrade() {
                HostInner::dispatch(&host, record, msg);
            }
        }));
        let weak = Arc::downgrade(inner);
        module.set_status_cb(Box::new(move |record, prev| {
            if let Some(host) = weak.upgrade() {
                host.on_status_change(record, prev);
            }
        }));

        inner
            .modules
            .insert(module.path_key().to_string(), Arc::clone(&module));
        inner
            .by_name
            .insert(module.name().to_string(), module.path_key().to_string());
        inner
            .by_uuid
            .insert(module.uuid_str().to_string(), module.path_key().to_string());

        if let Err(e) = module.start() {
            self.unregister(&module);
            module.destroy();
            return Err(e);
        }
        Ok(module)
    }

    fn unregister(&self, module: &Arc<Module>) {
        self.inner.modules.remove(module.path_key());
        self.inner.by_name.remove(module.name());
        self.inner.by_uuid.remove(module.uuid_str());
    }
}

impl HostInner {
    fn module_by_uuid(&self, uuid: &str) -> Option<Arc<Module>> {
        let key = self.by_uuid.get(uuid)?.clone();
        self.modules.get(&key).map(|m| Arc::clone(&m))
    }

    /// Per-module poller: runs on the record's watcher task for every
    /// normalized message the module delivers to the broker.
    fn dispatch(inner: &Arc<Self>, module: &Arc<Module>, msg: Message) {
        if msg.msg_type == MessageType::Request {
            match msg.topic.as_str() {
                MODULE_STATUS_TOPIC => {
                    Self::handle_module_status(module, &msg);
                    return;
                }
                EVENT_SUBSCRIBE_TOPIC => {
                    Self::handle_subscription(module, &msg, true);
                    return;
                }
                EVENT_UNSUBSCRIBE_TOPIC => {
                    Self::handle_subscription(module, &msg, false);
                    return;
                }
                _ => {
                    // Outbound request to a peer service: arm the
                    // disconnect tracker before routing.
                    let weak_host = Arc::downgrade(inner);
                    let weak_module = Arc::downgrade(module);
                    module.disconnect_arm(
                        &msg,
                        Box::new(move |synth| {
                            if let (Some(host), Some(module)) =
                                (weak_host.upgrade(), weak_module.upgrade())
                            {
                                host.forward(&module, synth);
                            }
                            Ok(())
                        }),
                    );
                }
            }
        }
        inner.forward(module, msg);
    }

    /// Service the `broker.module-status` RPC.
    fn handle_module_status(module: &Arc<Module>, msg: &Message) {
        let payload: ModuleStatusPayload = match msg.payload_as() {
            Ok(p) => p,
            Err(e) => {
                warn!(module = %module.name(), error = %e, "malformed module-status payload");
                Self::respond_to_module(module, msg, errnum::EINVAL);
                return;
            }
        };
        match ModuleStatus::from_wire(payload.status) {
            Some(ModuleStatus::Running) => {
                if module.status() == ModuleStatus::Init {
                    module.set_status(ModuleStatus::Running);
                }
                Self::respond_to_module(module, msg, 0);
            }
            Some(ModuleStatus::Finalizing) => {
                let status = module.status();
                if status != ModuleStatus::Finalizing && status != ModuleStatus::Exited {
                    module.set_status(ModuleStatus::Finalizing);
                }
                // After this reply the broker feeds the module nothing but
                // silence; the reply itself is the one message mute lets
                // through.
                module.mute();
                Self::respond_to_module(module, msg, 0);
            }
            Some(ModuleStatus::Exited) => {
                module.set_errnum(payload.errnum.unwrap_or(0));
                if module.status() != ModuleStatus::Exited {
                    module.set_status(ModuleStatus::Exited);
                }
                Self::respond_to_module(module, msg, 0);
            }
            Some(ModuleStatus::Init) | None => {
                warn!(module = %module.name(), status = payload.status, "invalid module status");
                Self::respond_to_module(module, msg, errnum::EINVAL);
            }
        }
    }

    /// Service `event.subscribe` / `event.unsubscribe`.
    fn handle_subscription(module: &Arc<Module>, msg: &Message, subscribe: bool) {
        let payload: SubscribePayload = match msg.payload_as() {
            Ok(p) => p,
            Err(e) => {
                warn!(module = %module.name(), error = %e, "malformed subscription payload");
                Self::respond_to_module(module, msg, errnum::EINVAL);
                return;
            }
        };
        if subscribe {
            module.subscribe(payload.topic);
        } else {
            module.unsubscribe(&payload.topic);
        }
        Self::respond_to_module(module, msg, 0);
    }

    fn respond_to_module(module: &Module, req: &Message, errnum_value: i32) {
        if req.has_flag(MessageFlags::NO_RESPONSE) {
            return;
        }
        let rep = if errnum_value == 0 {
            req.respond()
        } else {
            req.respond_error(errnum_value)
        };
        if let Err(e) = module.sendmsg(&rep) {
            warn!(module = %module.name(), topic = %req.topic, error = %e, "response undeliverable");
        }
    }

    /// Host bookkeeping for a status transition, then the broker's
    /// notification.
    fn on_status_change(&self, module: &Module, prev: ModuleStatus) {
        let status = module.status();
        debug!(module = %module.name(), %prev, %status, "module status change");
        match status {
            ModuleStatus::Running => {
                // The load request is answered once the module is up.
                if let Some(req) = module.pop_insmod() {
                    self.respond_request(&req, 0);
                }
            }
            ModuleStatus::Exited => {
                // Queued remove requests succeed now that the module is
                // down; a load request still pending here means the module
                // never came up.
                while let Some(req) = module.pop_rmmod() {
                    self.respond_request(&req, 0);
                }
                if let Some(req) = module.pop_insmod() {
                    self.respond_request(&req, module.errnum());
                }
            }
            ModuleStatus::Init | ModuleStatus::Finalizing => {}
        }
        if let Some(cb) = self.status_cb.read().as_ref() {
            if let Some(record) = self.module_by_uuid(module.uuid_str()) {
                cb(&record, prev);
            }
        }
    }

    fn respond_request(&self, req: &Message, errnum_value: i32) {
        if let Some(cb) = self.responder_cb.read().as_ref() {
            cb(req, errnum_value);
        } else {
            debug!(topic = %req.topic, errnum = errnum_value, "no responder installed; dropping reply");
        }
    }

    /// Route a non-internal module message to the broker, or apply the
    /// default policy when no router is installed.
    fn forward(&self, module: &Arc<Module>, msg: Message) {
        {
            let guard = self.receiver_cb.read();
            if let Some(cb) = guard.as_ref() {
                cb(module, msg);
                return;
            }
        }
        // No router: deny requests so module RPCs cannot hang.
        if msg.msg_type == MessageType::Request && !msg.has_flag(MessageFlags::NO_RESPONSE) {
            let rep = msg.respond_error(errnum::ENOSYS);
            if let Err(e) = module.sendmsg(&rep) {
                debug!(module = %module.name(), error = %e, "default deny undeliverable");
            }
        } else {
            trace!(topic = %msg.topic, "dropping unrouted module message");
        }
    }
}
