// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use tokio::sync::mpsc;

// Layer 3: Internal module imports
use super::error::EndpointError;
use crate::message::Message;

/// Factory for connected endpoint pairs.
pub struct Endpoint;

impl Endpoint {
    /// Create a connected pair: the broker end and the module end.
    ///
    /// Two crossed unbounded channels; whatever one end sends, the other
    /// receives in order.
    pub fn pair() -> (BrokerEnd, ModuleEnd) {
        let (to_module, from_broker) = mpsc::unbounded_channel();
        let (to_broker, from_module) = mpsc::unbounded_channel();
        (
            BrokerEnd {
                sender: EndpointSender { tx: to_module },
                receiver: EndpointReceiver { rx: from_module },
            },
            ModuleEnd {
                sender: EndpointSender { tx: to_broker },
                receiver: EndpointReceiver { rx: from_broker },
            },
        )
    }
}

/// Sending half of one endpoint direction. Sends never block.
#[derive(Debug, Clone)]
pub struct EndpointSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl EndpointSender {
    /// Queue a message for the peer.
    pub fn send(&self, msg: Message) -> Result<(), EndpointError> {
        self.tx.send(msg).map_err(|_| EndpointError::Closed)
    }
}

/// Receiving half of one endpoint direction.
#[derive(Debug)]
pub struct EndpointReceiver {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl EndpointReceiver {
    /// Receive the next message; `None` once the peer is gone and the queue
    /// is drained. Reactor-side primitive.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Blocking receive for the module worker thread. Must not be called
    /// from within the reactor.
    pub fn blocking_recv(&mut self) -> Option<Message> {
        self.rx.blocking_recv()
    }

    /// Non-blocking receive: `None` when nothing is queued (including after
    /// the peer is gone).
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

/// The broker (reactor) side of an endpoint.
#[derive(Debug)]
pub struct BrokerEnd {
    /// Broker-to-module direction.
    pub sender: EndpointSender,
    /// Module-to-broker direction.
    pub receiver: EndpointReceiver,
}

impl BrokerEnd {
    /// Split into independently owned halves.
    pub fn split(self) -> (EndpointSender, EndpointReceiver) {
        (self.sender, self.receiver)
    }
}

/// The module (worker thread) side of an endpoint.
#[derive(Debug)]
pub struct ModuleEnd {
    /// Module-to-broker direction.
    pub sender: EndpointSender,
    /// Broker-to-module direction.
    pub receiver: EndpointReceiver,
}

impl ModuleEnd {
    /// Split into independently owned halves.
    pub fn split(self) -> (EndpointSender, EndpointReceiver) {
        (self.sender, self.receiver)
    }
}
