//! Outbound envelope sink

use tokio::sync::mpsc;

use ripple_core::{RippleError, RippleResult};
use ripple_wire::Message;

/// Where outbound envelopes go.
///
/// `send` never blocks; delivery is best effort and may be lost in transit.
pub trait Outbox: Send + Sync + 'static {
    fn send(&self, message: Message) -> RippleResult<()>;
}

/// Outbox receiver channel
pub type OutboxReceiver = mpsc::UnboundedReceiver<Message>;

/// Outbox backed by an unbounded channel
#[derive(Clone, Debug)]
pub struct ChannelOutbox {
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelOutbox {
    /// Create an outbox and the receiver that drains it
    pub fn new() -> (Self, OutboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelOutbox { tx }, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Outbox for ChannelOutbox {
    fn send(&self, message: Message) -> RippleResult<()> {
        self.tx
            .send(message)
            .map_err(|_| RippleError::TransportClosed)
    }
}
