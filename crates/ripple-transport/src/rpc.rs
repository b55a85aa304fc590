//! Request/response correlation
//!
//! Outbound requests get a fresh `msg_id` from a local counter. The waiter
//! for that id is a one-shot channel held in a table until the matching
//! `in_reply_to` arrives or the waiter gives up.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use ripple_core::{MsgId, NodeId, RippleError, RippleResult};
use ripple_wire::{Body, Message, Payload};

use crate::Outbox;

/// Correlation table for outbound requests
#[derive(Debug, Default)]
pub struct Correlator {
    /// Last allocated id (first request gets 1)
    last_id: AtomicU64,
    /// Waiters keyed by the `msg_id` we sent
    pending: Mutex<HashMap<MsgId, oneshot::Sender<Message>>>,
}

impl Correlator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Allocate the next request id
    pub fn next_id(&self) -> MsgId {
        MsgId::new(self.last_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Send `payload` to `dest` as a request and return the reply future.
    ///
    /// The waiter is registered before the envelope leaves, so a reply can
    /// never race ahead of its registration.
    pub fn call<O: Outbox + ?Sized>(
        self: &Arc<Self>,
        outbox: &O,
        src: NodeId,
        dest: NodeId,
        payload: Payload,
    ) -> RippleResult<PendingReply> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        // Dropping the guard on a failed send unregisters the id.
        let reply = PendingReply {
            id,
            rx,
            table: Arc::clone(self),
        };

        outbox.send(Message {
            src,
            dest,
            body: Body::new(payload).with_msg_id(id),
        })?;

        Ok(reply)
    }

    /// Hand a response to whoever is waiting on its `in_reply_to`.
    ///
    /// Returns false when nobody is waiting (late, duplicate or unsolicited).
    pub fn resolve(&self, message: Message) -> bool {
        let Some(id) = message.body.in_reply_to else {
            return false;
        };

        let Some(tx) = self.pending.lock().remove(&id) else {
            tracing::debug!(%id, from = %message.src, "reply with no waiter");
            return false;
        };

        tx.send(message).is_ok()
    }

    /// Number of requests still waiting for a reply
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn forget(&self, id: MsgId) {
        self.pending.lock().remove(&id);
    }
}

/// Future resolving to the reply of one outbound request.
///
/// Dropping it (e.g. on timeout) removes its entry from the table.
#[derive(Debug)]
pub struct PendingReply {
    id: MsgId,
    rx: oneshot::Receiver<Message>,
    table: Arc<Correlator>,
}

impl PendingReply {
    pub fn id(&self) -> MsgId {
        self.id
    }
}

impl Future for PendingReply {
    type Output = RippleResult<Message>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(message)) => Poll::Ready(Ok(message)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RippleError::TransportClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.table.forget(self.id);
    }
}
