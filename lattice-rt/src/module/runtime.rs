//! Worker-thread runtime for hosted modules.
//!
//! Runs on the module's own OS thread. Opens the module side of the
//! endpoint, primes the configuration and attribute caches, announces
//! RUNNING, invokes the entry point, and walks the shutdown protocol: the
//! synchronous FINALIZING barrier, the post-shutdown request drain, and the
//! fire-and-forget EXITED publish.
//!
//! The FINALIZING barrier is the core ordering guarantee of a module's
//! teardown: the broker promises not to deliver further traffic after the
//! reply, and this thread promises not to close its handle before the
//! reply.

// Layer 1: Standard library imports
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tracing::{debug, error, warn};

// Layer 3: Internal module imports
use super::record::Module;
use super::status::{ModuleStatus, ModuleStatusPayload, MODULE_STATUS_TOPIC};
use crate::handle::{HandleError, HandleParams, ModuleHandle};
use crate::util::errnum;

/// Worker-thread body. Invoked by [`Module::start`] on the freshly spawned
/// thread.
pub(crate) fn run(module: Arc<Module>) {
    // The span carries the module name on every log line this thread emits
    // (the module's log appname).
    let span = tracing::info_span!("module", name = %module.name());
    let _guard = span.enter();

    let Some(end) = module.take_module_end() else {
        error!("module endpoint already taken; worker exiting");
        return;
    };

    // Open the handle on the module side of the endpoint, priming the
    // attribute cache and attaching the configuration snapshot so lookups
    // inside the module always succeed locally.
    let mut handle = ModuleHandle::open(
        end,
        HandleParams {
            name: module.name().to_string(),
            uuid: module.uuid_str().to_string(),
            rank: module.rank(),
            conf: module.config_snapshot(),
            attrs: module.attr_cache(),
        },
    );
    debug!(uri = %handle.uri(), "module handle open");

    // The broker thread handles signals.
    #[cfg(unix)]
    block_signals();

    if let Err(e) = announce(&mut handle, ModuleStatusPayload::new(ModuleStatus::Running)) {
        warn!(error = %e, "failed to announce RUNNING");
    }

    // Run the module's main.
    let args = module.args().to_vec();
    let invoked = catch_unwind(AssertUnwindSafe(|| {
        module.image().invoke(&mut handle, &args)
    }));
    let mod_main_errnum = match invoked {
        Ok(n) => n,
        Err(_) => {
            error!("module main panicked");
            errnum::ECONNRESET
        }
    };
    if mod_main_errnum != 0 {
        error!(errnum = mod_main_errnum, "module exiting abnormally");
    }

    // Synchronize the FINALIZING state with the broker, so the broker stops
    // feeding messages to this module until we are fully shut down.
    if let Err(e) = finalizing(&mut handle) {
        warn!(error = %e, "failed to set module state to finalizing");
    }

    // Respond to any unhandled requests received during shutdown.
    while let Some(req) = handle.try_recv_request() {
        debug!(topic = %req.topic, "responding to post-shutdown request");
        if let Err(e) = handle.respond_error(&req, errnum::ENOSYS) {
            warn!(topic = %req.topic, error = %e, "post-shutdown response failed");
        }
    }

    if let Err(e) = announce(&mut handle, ModuleStatusPayload::exited(mod_main_errnum)) {
        warn!(error = %e, "failed to announce EXITED");
    }
    // The handle drops here, closing the module side of the endpoint.
}

/// Fire-and-forget status announcement.
fn announce(handle: &mut ModuleHandle, payload: ModuleStatusPayload) -> Result<(), HandleError> {
    let value = serde_json::to_value(payload)?;
    handle.rpc_noresponse(MODULE_STATUS_TOPIC, Some(value))
}

/// Synchronous FINALIZING RPC; blocks until the broker acknowledges.
fn finalizing(handle: &mut ModuleHandle) -> Result<(), HandleError> {
    let value = serde_json::to_value(ModuleStatusPayload::new(ModuleStatus::Finalizing))?;
    handle.rpc(MODULE_STATUS_TOPIC, Some(value)).map(|_| ())
}

#[cfg(unix)]
fn block_signals() {
    use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow};

    if let Err(e) = pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&SigSet::all()), None) {
        warn!(error = %e, "failed to block signals on module thread");
    }
}
