// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use tracing::{debug, warn};

// Layer 3: Internal module imports
use crate::endpoint::EndpointError;
use crate::message::{Message, MessageFlags, MessageType};

/// Send function handed to the tracker when it is first armed. Synthetic
/// disconnect requests go out through it at teardown.
pub type DisconnectSendFn = Box<dyn Fn(Message) -> Result<(), EndpointError> + Send + Sync>;

/// Records which peer services a module has contacted, so its termination
/// can notify each one.
///
/// Every outbound request arms the tracker with a (service, sender) tuple;
/// firing it synthesizes one `<service>.disconnect` request per recorded
/// tuple, preventing orphaned server-side state. Firing is idempotent and
/// individual send failures do not halt the sweep.
#[derive(Default)]
pub struct DisconnectTracker {
    send: Option<DisconnectSendFn>,
    targets: Vec<Target>,
    fired: bool,
}

struct Target {
    service: String,
    sender: String,
    cred: crate::message::Credentials,
}

impl DisconnectTracker {
    /// Empty tracker with no send function installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the (service, sender) tuple of an outbound request.
    ///
    /// The first call installs `send`; later calls keep the original. Only
    /// requests with at least one routing hop are tracked; duplicates are
    /// collapsed.
    pub fn arm(&mut self, msg: &Message, send: DisconnectSendFn) {
        if self.send.is_none() {
            self.send = Some(send);
        }
        if msg.msg_type != MessageType::Request {
            return;
        }
        let Some(origin) = msg.route_origin() else {
            return;
        };
        let service = msg.topic.split('.').next().unwrap_or_default();
        if service.is_empty() {
            return;
        }
        if self
            .targets
            .iter()
            .any(|t| t.service == service && t.sender == origin)
        {
            return;
        }
        self.targets.push(Target {
            service: service.to_string(),
            sender: origin.to_string(),
            cred: msg.cred,
        });
    }

    /// Number of recorded (service, sender) tuples.
    pub fn armed(&self) -> usize {
        self.targets.len()
    }

    /// Send one synthetic disconnect per recorded tuple.
    ///
    /// Safe to call more than once; only the first call sweeps.
    pub fn fire(&mut self) {
        if self.fired {
            return;
        }
        self.fired = true;
        let Some(send) = self.send.take() else {
            self.targets.clear();
            return;
        };
        for target in self.targets.drain(..) {
            let topic = format!("{}.disconnect", target.service);
            debug!(topic = %topic, sender = %target.sender, "sending disconnect");
            let msg = Message::request(&topic)
                .with_flags(MessageFlags::NO_RESPONSE)
                .with_route(target.sender.clone())
                .with_credentials(target.cred);
            if let Err(e) = send(msg) {
                warn!(topic = %topic, error = %e, "disconnect notification failed");
            }
        }
    }
}
