//! Gossip disseminator - retry-until-acknowledged fan-out
//!
//! Every newly accepted value gets one round, running on its own task:
//!
//! ```text
//! pending = neighbors() \ {src}
//! while pending is not empty:
//!     send broadcast{value} to every pending neighbor (concurrently)
//!     until the retry interval elapses:
//!         broadcast_ok from n  -> remove n
//!         n re-announces value -> remove n
//! ```
//!
//! Rounds never give up. Receivers absorb duplicates in their own seen
//! set, so re-sending is always safe.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant};

use ripple_core::{NodeId, Value};
use ripple_transport::{Correlator, Outbox};
use ripple_wire::Payload;

use crate::{DiffusionCounters, DiffusionStats, TopologyStore};

/// Fixed delay between re-sends to an unresponsive neighbor
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Per-neighbor gossip state within one round
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    /// Not yet known to hold the value; re-sent every interval
    Pending,
    /// Acknowledged (explicitly or by re-announcing); terminal
    Acknowledged,
}

/// Spawns and tracks dissemination rounds
#[derive(Clone)]
pub struct Disseminator {
    inner: Arc<Inner>,
}

struct Inner {
    local: NodeId,
    topology: Arc<TopologyStore>,
    rpc: Arc<Correlator>,
    outbox: Arc<dyn Outbox>,
    retry_interval: Duration,
    /// Running rounds, keyed by value; the channel feeds re-announcements
    rounds: Mutex<HashMap<Value, mpsc::UnboundedSender<NodeId>>>,
    counters: DiffusionCounters,
}

impl Disseminator {
    pub fn new(
        local: NodeId,
        topology: Arc<TopologyStore>,
        rpc: Arc<Correlator>,
        outbox: Arc<dyn Outbox>,
        retry_interval: Duration,
    ) -> Self {
        Disseminator {
            inner: Arc::new(Inner {
                local,
                topology,
                rpc,
                outbox,
                retry_interval,
                rounds: Mutex::new(HashMap::new()),
                counters: DiffusionCounters::new(),
            }),
        }
    }

    /// Start propagating a newly accepted value.
    ///
    /// The retry set is the neighbor list at this moment minus `src`.
    /// Returns `None` when there is nobody to send to.
    pub fn disseminate(&self, value: Value, src: Option<&NodeId>) -> Option<JoinHandle<()>> {
        let pending: HashSet<NodeId> = self
            .inner
            .topology
            .neighbors()
            .iter()
            .filter(|peer| Some(*peer) != src)
            .cloned()
            .collect();

        if pending.is_empty() {
            tracing::debug!(%value, "no neighbors to gossip to");
            return None;
        }

        let (holders_tx, holders_rx) = mpsc::unbounded_channel();
        self.inner.rounds.lock().insert(value, holders_tx);
        self.inner.counters.record_round_started();

        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            inner.run_round(value, pending, holders_rx).await;
        }))
    }

    /// Note that `peer` already holds `value` because it sent it to us.
    ///
    /// Returns true if a running round was told about it.
    pub fn observe_holder(&self, value: Value, peer: &NodeId) -> bool {
        self.inner
            .rounds
            .lock()
            .get(&value)
            .is_some_and(|round| round.send(peer.clone()).is_ok())
    }

    /// Number of rounds still running
    pub fn in_flight(&self) -> usize {
        self.inner.rounds.lock().len()
    }

    pub fn stats(&self) -> DiffusionStats {
        self.inner.counters.snapshot()
    }
}

impl Inner {
    async fn run_round(
        &self,
        value: Value,
        mut pending: HashSet<NodeId>,
        mut holders: mpsc::UnboundedReceiver<NodeId>,
    ) {
        let mut attempt: u64 = 0;
        tracing::debug!(%value, peers = pending.len(), "dissemination started");

        while !pending.is_empty() {
            attempt += 1;
            if attempt > 1 {
                self.counters.record_retry();
            }

            let deadline = Instant::now() + self.retry_interval;
            let mut replies = self.send_to_pending(value, &pending, deadline);

            loop {
                tokio::select! {
                    Some(joined) = replies.join_next() => {
                        if let Ok((peer, PeerState::Acknowledged)) = joined {
                            if pending.remove(&peer) {
                                self.counters.record_ack();
                            }
                        }
                    }
                    Some(peer) = holders.recv() => {
                        if pending.remove(&peer) {
                            self.counters.record_implicit_ack();
                        }
                    }
                    _ = time::sleep_until(deadline) => break,
                }

                if pending.is_empty() {
                    break;
                }
            }

            if !pending.is_empty() {
                tracing::debug!(%value, attempt, unacked = ?pending, "retrying");
            }
            // Dropping `replies` aborts stragglers and releases their
            // correlation entries.
        }

        self.rounds.lock().remove(&value);
        self.counters.record_round_completed();
        tracing::debug!(%value, attempts = attempt, "dissemination complete");
    }

    /// Send one `broadcast` to every pending neighbor, each awaited on its own task
    fn send_to_pending(
        &self,
        value: Value,
        pending: &HashSet<NodeId>,
        deadline: Instant,
    ) -> JoinSet<(NodeId, PeerState)> {
        let mut replies = JoinSet::new();

        for peer in pending {
            let call = self.rpc.call(
                self.outbox.as_ref(),
                self.local.clone(),
                peer.clone(),
                Payload::Broadcast { message: value },
            );

            let reply = match call {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::debug!(%value, %peer, "gossip send failed: {}", e);
                    continue;
                }
            };
            self.counters.record_send();

            let peer = peer.clone();
            replies.spawn(async move {
                let state = match time::timeout_at(deadline, reply).await {
                    Ok(Ok(message)) if message.body.payload == Payload::BroadcastOk => {
                        PeerState::Acknowledged
                    }
                    Ok(Ok(message)) => {
                        tracing::debug!(%peer, kind = message.body.payload.kind(), "unexpected gossip reply");
                        PeerState::Pending
                    }
                    Ok(Err(_)) | Err(_) => PeerState::Pending,
                };
                (peer, state)
            });
        }

        replies
    }
}
