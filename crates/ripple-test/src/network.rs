//! In-process network between ripple nodes
//!
//! Every node and client shares one outbox. A router task drains it and
//! hands each envelope to the destination's inbox. Links between two nodes
//! go through a [`ChaosLink`]; links touching a client are always reliable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use ripple_core::{NodeId, Value};
use ripple_transport::{ChannelOutbox, InboundReceiver, Outbox, OutboxReceiver};
use ripple_wire::{Inbound, Message, Payload};

use crate::{ChaosConfig, ChaosLink, ChaosStats};

/// One node-to-node `broadcast` request handed to the network
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GossipRecord {
    pub from: NodeId,
    pub to: NodeId,
    pub value: Value,
}

/// Client mailbox
pub type ClientReceiver = mpsc::UnboundedReceiver<Message>;

type LinkKey = (NodeId, NodeId);

/// Simulated network
pub struct SimNetwork {
    state: Arc<NetworkState>,
    outbox: ChannelOutbox,
    router: JoinHandle<()>,
}

struct NetworkState {
    chaos: ChaosConfig,
    seed: u64,
    nodes: Mutex<HashMap<NodeId, mpsc::Sender<Inbound>>>,
    clients: Mutex<HashMap<NodeId, mpsc::UnboundedSender<Message>>>,
    links: Mutex<HashMap<LinkKey, ChaosLink>>,
    overrides: Mutex<HashMap<LinkKey, ChaosConfig>>,
    gossip: Mutex<Vec<GossipRecord>>,
    undeliverable: AtomicU64,
}

impl SimNetwork {
    /// Start routing. Node links use `chaos`, seeded from `seed`.
    pub fn start(chaos: ChaosConfig, seed: u64) -> Self {
        let (outbox, rx) = ChannelOutbox::new();
        let state = Arc::new(NetworkState {
            chaos,
            seed,
            nodes: Mutex::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
            links: Mutex::new(HashMap::new()),
            overrides: Mutex::new(HashMap::new()),
            gossip: Mutex::new(Vec::new()),
            undeliverable: AtomicU64::new(0),
        });

        let router = tokio::spawn(route_loop(Arc::clone(&state), rx));

        SimNetwork {
            state,
            outbox,
            router,
        }
    }

    /// Register a node and return its inbox
    pub fn add_node(&self, id: NodeId, buffer_size: usize) -> InboundReceiver {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        self.state.nodes.lock().insert(id, tx);
        rx
    }

    /// Register a client and return its mailbox
    pub fn add_client(&self, id: NodeId) -> ClientReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.clients.lock().insert(id, tx);
        rx
    }

    /// Close a node's inbox. Its event loop drains and stops.
    pub fn disconnect(&self, id: &NodeId) -> bool {
        self.state.nodes.lock().remove(id).is_some()
    }

    /// Close every node inbox
    pub fn disconnect_all(&self) {
        self.state.nodes.lock().clear();
    }

    /// Outbox shared by every participant
    pub fn outbox(&self) -> Arc<dyn Outbox> {
        Arc::new(self.outbox.clone())
    }

    /// Replace the chaos on the directed link `from -> to`
    pub fn set_link(&self, from: &NodeId, to: &NodeId, config: ChaosConfig) {
        let key = (from.clone(), to.clone());
        self.state.links.lock().remove(&key);
        self.state.overrides.lock().insert(key, config);
    }

    /// Drop everything between `a` and `b` in both directions
    pub fn partition(&self, a: &NodeId, b: &NodeId) {
        self.set_link(a, b, ChaosConfig::partitioned());
        self.set_link(b, a, ChaosConfig::partitioned());
    }

    /// Restore the default chaos between `a` and `b`
    pub fn heal(&self, a: &NodeId, b: &NodeId) {
        for key in [(a.clone(), b.clone()), (b.clone(), a.clone())] {
            self.state.overrides.lock().remove(&key);
            self.state.links.lock().remove(&key);
        }
    }

    /// Every node-to-node `broadcast` sent so far, retries included
    pub fn gossip(&self) -> Vec<GossipRecord> {
        self.state.gossip.lock().clone()
    }

    /// How many times `from` sent `value` to `to`
    pub fn gossip_count(&self, from: &NodeId, to: &NodeId, value: Value) -> usize {
        self.state
            .gossip
            .lock()
            .iter()
            .filter(|r| &r.from == from && &r.to == to && r.value == value)
            .count()
    }

    /// How many `broadcast` requests `from` sent to anyone
    pub fn gossip_from(&self, from: &NodeId) -> usize {
        self.state
            .gossip
            .lock()
            .iter()
            .filter(|r| &r.from == from)
            .count()
    }

    /// Statistics for the directed link `from -> to`, if it carried anything
    pub fn link_stats(&self, from: &NodeId, to: &NodeId) -> Option<ChaosStats> {
        self.state
            .links
            .lock()
            .get(&(from.clone(), to.clone()))
            .map(|link| link.stats().clone())
    }

    /// Envelopes addressed to nobody we know
    pub fn undeliverable(&self) -> u64 {
        self.state.undeliverable.load(Ordering::Relaxed)
    }
}

impl Drop for SimNetwork {
    fn drop(&mut self) {
        self.router.abort();
    }
}

async fn route_loop(state: Arc<NetworkState>, mut rx: OutboxReceiver) {
    while let Some(message) = rx.recv().await {
        state.route(message);
    }
}

impl NetworkState {
    fn route(&self, message: Message) {
        if let Some(client) = self.clients.lock().get(&message.dest) {
            if client.send(message).is_err() {
                tracing::debug!("client mailbox closed");
            }
            return;
        }

        let Some(inbox) = self.nodes.lock().get(&message.dest).cloned() else {
            tracing::debug!(dest = %message.dest, kind = message.body.payload.kind(), "undeliverable");
            self.undeliverable.fetch_add(1, Ordering::Relaxed);
            return;
        };

        if message.src.is_client() {
            deliver(inbox, message);
            return;
        }

        self.record(&message);

        let delays = self.link_plan(&message.src, &message.dest);
        if delays.is_empty() {
            tracing::trace!(src = %message.src, dest = %message.dest, "lost in transit");
        }

        for delay in delays {
            let inbox = inbox.clone();
            let message = message.clone();
            if delay.is_zero() {
                deliver(inbox, message);
            } else {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = inbox.send(Inbound::Message(message)).await;
                });
            }
        }
    }

    fn record(&self, message: &Message) {
        if let Payload::Broadcast { message: value } = &message.body.payload {
            self.gossip.lock().push(GossipRecord {
                from: message.src.clone(),
                to: message.dest.clone(),
                value: *value,
            });
        }
    }

    fn link_plan(&self, from: &NodeId, to: &NodeId) -> Vec<std::time::Duration> {
        let key = (from.clone(), to.clone());
        let mut links = self.links.lock();
        let next_seed = self.seed.wrapping_add(links.len() as u64 + 1);
        let link = links.entry(key).or_insert_with_key(|key| {
            let config = self
                .overrides
                .lock()
                .get(key)
                .cloned()
                .unwrap_or_else(|| self.chaos.clone());
            ChaosLink::new(config, next_seed)
        });
        link.plan()
    }
}

/// Hand over immediately, keeping order; fall back to a task when full
fn deliver(inbox: mpsc::Sender<Inbound>, message: Message) {
    match inbox.try_send(Inbound::Message(message)) {
        Ok(()) => {}
        Err(TrySendError::Full(inbound)) => {
            tokio::spawn(async move {
                let _ = inbox.send(inbound).await;
            });
        }
        Err(TrySendError::Closed(_)) => {
            tracing::trace!("inbox closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn broadcast(src: &str, dest: &str, value: i64) -> Message {
        Message::new(
            NodeId::from(src),
            NodeId::from(dest),
            Payload::Broadcast {
                message: Value::new(value),
            },
        )
    }

    async fn next(inbox: &mut InboundReceiver) -> Option<Message> {
        match tokio::time::timeout(Duration::from_millis(200), inbox.recv()).await {
            Ok(Some(Inbound::Message(message))) => Some(message),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_routes_between_nodes() {
        let network = SimNetwork::start(ChaosConfig::reliable(), 1);
        let _n1 = network.add_node(NodeId::from("n1"), 16);
        let mut n2 = network.add_node(NodeId::from("n2"), 16);

        network.outbox().send(broadcast("n1", "n2", 7)).unwrap();

        let got = next(&mut n2).await.unwrap();
        assert_eq!(got.src, NodeId::from("n1"));
        assert_eq!(
            network.gossip(),
            vec![GossipRecord {
                from: NodeId::from("n1"),
                to: NodeId::from("n2"),
                value: Value::new(7),
            }]
        );
        let stats = network
            .link_stats(&NodeId::from("n1"), &NodeId::from("n2"))
            .unwrap();
        assert_eq!(stats.messages_sent, 1);
    }

    #[tokio::test]
    async fn test_client_links_skip_chaos() {
        let network = SimNetwork::start(ChaosConfig::partitioned(), 1);
        let mut n1 = network.add_node(NodeId::from("n1"), 16);
        let mut c1 = network.add_client(NodeId::from("c1"));

        network.outbox().send(broadcast("c1", "n1", 1)).unwrap();
        assert!(next(&mut n1).await.is_some());

        let reply = Message::new(NodeId::from("n1"), NodeId::from("c1"), Payload::BroadcastOk);
        network.outbox().send(reply).unwrap();
        assert!(c1.recv().await.is_some());

        // Client traffic is not gossip
        assert!(network.gossip().is_empty());
    }

    #[tokio::test]
    async fn test_partition_and_heal() {
        let network = SimNetwork::start(ChaosConfig::reliable(), 1);
        let (a, b) = (NodeId::from("n1"), NodeId::from("n2"));
        let _n1 = network.add_node(a.clone(), 16);
        let mut n2 = network.add_node(b.clone(), 16);

        network.partition(&a, &b);
        network.outbox().send(broadcast("n1", "n2", 1)).unwrap();
        assert!(next(&mut n2).await.is_none());

        network.heal(&a, &b);
        network.outbox().send(broadcast("n1", "n2", 2)).unwrap();
        assert_eq!(
            next(&mut n2).await.unwrap().body.payload,
            Payload::Broadcast {
                message: Value::new(2)
            }
        );

        // Lost sends are still recorded as sent
        assert_eq!(network.gossip_from(&a), 2);
    }

    #[tokio::test]
    async fn test_unknown_destination() {
        let network = SimNetwork::start(ChaosConfig::reliable(), 1);
        network.outbox().send(broadcast("n1", "n9", 1)).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(network.undeliverable(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_closes_inbox() {
        let network = SimNetwork::start(ChaosConfig::reliable(), 1);
        let mut n1 = network.add_node(NodeId::from("n1"), 16);

        assert!(network.disconnect(&NodeId::from("n1")));
        assert!(n1.recv().await.is_none());
    }
}
