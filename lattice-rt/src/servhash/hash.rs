// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::{Mutex, RwLock};
use tracing::debug;

// Layer 3: Internal module imports
use super::entry::{EntryState, ServiceEntry};
use super::error::ServhashError;
use super::upstream::Upstream;
use crate::message::Message;

/// Answers a retained client request: (request, owner uuid, errnum).
pub type RespondCallback = Arc<dyn Fn(&Message, &str, i32) + Send + Sync>;

/// Router-side table of proxied service registrations.
///
/// Cheap to clone; clones share the table. Upstream completions run as
/// reactor tasks and re-enter the table through short critical sections, so
/// no lock is ever held across an upstream await.
#[derive(Clone)]
pub struct ServiceHash {
    services: Arc<Mutex<HashMap<String, ServiceEntry>>>,
    upstream: Arc<dyn Upstream>,
    respond: Arc<RwLock<Option<RespondCallback>>>,
}

impl ServiceHash {
    /// Empty table over the given upstream.
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        Self {
            services: Arc::new(Mutex::new(HashMap::new())),
            upstream,
            respond: Arc::new(RwLock::new(None)),
        }
    }

    /// Install the responder invoked when a retained add/remove request is
    /// answered.
    pub fn set_respond(&self, cb: RespondCallback) {
        *self.respond.write() = Some(cb);
    }

    /// Proxy a client's service-add request.
    ///
    /// Rejects with *exists* if `name` is present. Otherwise retains the
    /// request, issues the asynchronous upstream registration, and returns;
    /// the responder is called with errnum 0 (entry becomes live) or the
    /// upstream failure (entry deleted) when the registration completes.
    pub fn add(&self, name: &str, owner: &str, msg: Message) -> Result<(), ServhashError> {
        {
            let mut services = self.services.lock();
            if services.contains_key(name) {
                return Err(ServhashError::Exists(name.to_string()));
            }
            let entry = ServiceEntry::new(name, owner, Arc::clone(&self.upstream), msg);
            services.insert(name.to_string(), entry);
        }
        debug!(service = %name, %owner, "upstream service.register");

        let services = Arc::downgrade(&self.services);
        let respond = Arc::clone(&self.respond);
        let upstream = Arc::clone(&self.upstream);
        let name = name.to_string();
        let owner = owner.to_string();
        tokio::spawn(async move {
            let errnum = match upstream.service_register(&name).await {
                Ok(()) => 0,
                Err(e) => e.errnum,
            };
            let Some(services) = services.upgrade() else {
                return;
            };
            let request = {
                let mut table = services.lock();
                // Deleted while the add was in flight (client disconnect):
                // the entry teardown already unwound upstream.
                let Some(entry) = table.get_mut(&name) else {
                    return;
                };
                entry.add_done = true;
                if errnum == 0 {
                    entry.live = true;
                }
                entry.add_request.clone()
            };
            if let Some(request) = request {
                if let Some(cb) = respond.read().clone() {
                    cb(&request, &owner, errnum);
                }
            }
            if errnum != 0 {
                services.lock().remove(&name);
            }
        });
        Ok(())
    }

    /// Proxy a client's service-remove request.
    ///
    /// Rejects with *no entry* if `name` is absent, owned by someone else,
    /// or already has a remove in flight. Otherwise retains the request and
    /// issues the upstream unregistration; on completion the responder is
    /// called with the upstream errnum and the entry deleted
    /// unconditionally.
    pub fn remove(&self, name: &str, owner: &str, msg: Message) -> Result<(), ServhashError> {
        {
            let mut services = self.services.lock();
            let entry = services
                .get_mut(name)
                .filter(|e| e.owner == owner && !e.remove_issued)
                .ok_or_else(|| ServhashError::NoEntry(name.to_string()))?;
            entry.remove_request = Some(msg);
            entry.remove_issued = true;
        }
        debug!(service = %name, %owner, "upstream service.unregister");

        let services = Arc::downgrade(&self.services);
        let respond = Arc::clone(&self.respond);
        let upstream = Arc::clone(&self.upstream);
        let name = name.to_string();
        let owner = owner.to_string();
        tokio::spawn(async move {
            let errnum = match upstream.service_unregister(&name).await {
                Ok(()) => 0,
                Err(e) => e.errnum,
            };
            let Some(services) = services.upgrade() else {
                return;
            };
            let Some(mut entry) = services.lock().remove(&name) else {
                return;
            };
            entry.live = false;
            if let Some(request) = entry.remove_request.take() {
                if let Some(cb) = respond.read().clone() {
                    cb(&request, &owner, errnum);
                }
            }
        });
        Ok(())
    }

    /// Resolve a request message to the uuid of the owning client: linear
    /// scan, first entry whose matcher accepts the message.
    pub fn match_owner(&self, msg: &Message) -> Result<String, ServhashError> {
        let services = self.services.lock();
        services
            .values()
            .find(|e| e.matcher.matches(msg))
            .map(|e| e.owner.clone())
            .ok_or_else(|| ServhashError::NoEntry(msg.topic.clone()))
    }

    /// Delete every entry owned by `owner`.
    ///
    /// Entry teardown unwinds upstream registrations as needed; no client
    /// responses are sent.
    pub fn disconnect(&self, owner: &str) {
        self.services.lock().retain(|_, e| e.owner != owner);
    }

    /// Drop the whole table, each entry unwinding upstream as needed.
    pub fn destroy(&self) {
        self.services.lock().clear();
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.services.lock().len()
    }

    /// True if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.services.lock().is_empty()
    }

    /// Observable state of an entry, if present.
    pub fn entry_state(&self, name: &str) -> Option<EntryState> {
        self.services.lock().get(name).map(ServiceEntry::state)
    }
}
