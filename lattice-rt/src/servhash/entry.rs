// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::upstream::Upstream;
use crate::message::{Message, MessageMatch};

/// Observable lifecycle of a service entry.
///
/// An entry is created add-pending, becomes live when the upstream
/// registration succeeds, and is remove-pending from the moment an
/// unregister has been issued until the entry is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Upstream `service.register` still in flight.
    AddPending,
    /// Registered upstream; no remove issued.
    Live,
    /// Upstream `service.unregister` issued, completion pending.
    RemovePending,
}

/// One proxied service registration.
pub(crate) struct ServiceEntry {
    pub(crate) name: String,
    pub(crate) owner: String,
    pub(crate) matcher: MessageMatch,
    /// Client request retained until the upstream add completes.
    pub(crate) add_request: Option<Message>,
    /// Client request retained until the upstream remove completes.
    pub(crate) remove_request: Option<Message>,
    /// Upstream add completed (successfully or not).
    pub(crate) add_done: bool,
    /// Upstream add succeeded and no remove has completed.
    pub(crate) live: bool,
    /// An upstream remove has been issued.
    pub(crate) remove_issued: bool,
    upstream: Arc<dyn Upstream>,
}

impl ServiceEntry {
    pub(crate) fn new(
        name: &str,
        owner: &str,
        upstream: Arc<dyn Upstream>,
        add_request: Message,
    ) -> Self {
        Self {
            name: name.to_string(),
            owner: owner.to_string(),
            matcher: MessageMatch::service(name),
            add_request: Some(add_request),
            remove_request: None,
            add_done: false,
            live: false,
            remove_issued: false,
            upstream,
        }
    }

    pub(crate) fn state(&self) -> EntryState {
        if self.remove_issued {
            EntryState::RemovePending
        } else if self.live {
            EntryState::Live
        } else {
            EntryState::AddPending
        }
    }

    /// True when dropping this entry would abandon an upstream
    /// registration: the add is still pending, or the service is live with
    /// no remove issued.
    fn needs_unregister(&self) -> bool {
        if !self.live && !self.add_done {
            return true; // pending service.register request
        }
        if self.live && !self.remove_issued {
            return true; // registered, service.unregister never sent
        }
        false
    }
}

impl Drop for ServiceEntry {
    /// Entry teardown keeps upstream consistent: if anything could be left
    /// registered, send an open-loop unregister and discard its outcome.
    fn drop(&mut self) {
        if !self.needs_unregister() {
            return;
        }
        let upstream = Arc::clone(&self.upstream);
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                debug!(service = %name, "open-loop upstream unregister");
                rt.spawn(async move {
                    if let Err(e) = upstream.service_unregister(&name).await {
                        debug!(service = %name, error = %e, "open-loop unregister discarded");
                    }
                });
            }
            Err(_) => {
                warn!(service = %name, "no reactor; skipping open-loop unregister");
            }
        }
    }
}
