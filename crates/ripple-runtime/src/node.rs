//! Ripple Node - inbound request routing
//!
//! A node owns its seen set, its neighbor list and its dissemination
//! rounds. Nothing is shared with other nodes; the cluster converges only
//! through gossip.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ripple_core::{NodeId, RippleError, RippleResult, Value};
use ripple_diffusion::{DiffusionStats, Disseminator, SeenSet, TopologyMap, TopologyStore};
use ripple_transport::{Correlator, Outbox};
use ripple_wire::{Message, Payload};

use crate::NodeConfig;

#[derive(Debug, Default)]
struct RuntimeCounters {
    accepted: AtomicU64,
    duplicates: AtomicU64,
    reads: AtomicU64,
    topology_updates: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time node statistics
#[derive(Clone, Debug, Default)]
pub struct RuntimeStats {
    /// Values accepted for the first time
    pub accepted: u64,
    /// `broadcast` requests for values already seen
    pub duplicates: u64,
    pub reads: u64,
    pub topology_updates: u64,
    /// Requests answered with an error
    pub rejected: u64,
    pub diffusion: DiffusionStats,
}

/// Ripple node - the runtime entity
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeState>,
}

struct NodeState {
    /// Identity assigned by `init`
    id: NodeId,
    /// Every node in the cluster, as listed by `init`
    cluster: Vec<NodeId>,
    seen: SeenSet,
    topology: Arc<TopologyStore>,
    gossip: Disseminator,
    rpc: Arc<Correlator>,
    outbox: Arc<dyn Outbox>,
    counters: RuntimeCounters,
}

impl Node {
    /// Create a node with no neighbors yet
    pub fn new(
        id: NodeId,
        cluster: Vec<NodeId>,
        outbox: Arc<dyn Outbox>,
        config: &NodeConfig,
    ) -> Self {
        let topology = Arc::new(TopologyStore::new());
        let rpc = Correlator::new();
        let gossip = Disseminator::new(
            id.clone(),
            Arc::clone(&topology),
            Arc::clone(&rpc),
            Arc::clone(&outbox),
            config.retry_interval,
        );

        Node {
            inner: Arc::new(NodeState {
                id,
                cluster,
                seen: SeenSet::new(),
                topology,
                gossip,
                rpc,
                outbox,
                counters: RuntimeCounters::default(),
            }),
        }
    }

    /// Get node ID
    pub fn id(&self) -> &NodeId {
        &self.inner.id
    }

    pub fn cluster(&self) -> &[NodeId] {
        &self.inner.cluster
    }

    /// Current neighbors
    pub fn neighbors(&self) -> Vec<NodeId> {
        self.inner.topology.neighbors().to_vec()
    }

    /// Every value accepted so far
    pub fn values(&self) -> Vec<Value> {
        self.inner.seen.snapshot()
    }

    /// Hand a reply to the request waiting for it.
    ///
    /// Returns false if `message` is not a reply or nobody is waiting.
    pub fn route_reply(&self, message: Message) -> bool {
        message.is_response() && self.inner.rpc.resolve(message)
    }

    /// Handle one inbound request and send its reply (if any)
    pub fn handle(&self, message: Message) -> RippleResult<()> {
        match &message.body.payload {
            Payload::Broadcast { message: value } => self.handle_broadcast(&message, *value),
            Payload::Read => self.handle_read(&message),
            Payload::Topology { topology } => self.handle_topology(&message, topology),
            Payload::Init { node_id, .. } => self.handle_reinit(&message, node_id),
            other => {
                let err = RippleError::NotSupported(format!("`{}` is not a request", other.kind()));
                self.reject(&message, &err)
            }
        }
    }

    /// `broadcast` from a client (write) or from a peer (gossip)
    fn handle_broadcast(&self, message: &Message, value: Value) -> RippleResult<()> {
        let from_peer = !message.src.is_client();

        if self.inner.seen.accept(value) {
            self.inner.counters.accepted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%value, from = %message.src, "accepted");

            let src = from_peer.then_some(&message.src);
            self.inner.gossip.disseminate(value, src);
        } else {
            self.inner.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            if from_peer {
                self.inner.gossip.observe_holder(value, &message.src);
            }
        }

        // Fire-and-forget gossip carries no msg_id and must not be answered.
        if from_peer && !message.expects_reply() {
            return Ok(());
        }
        self.send(message.reply(Payload::BroadcastOk))
    }

    fn handle_read(&self, message: &Message) -> RippleResult<()> {
        self.inner.counters.reads.fetch_add(1, Ordering::Relaxed);
        let messages = self.inner.seen.snapshot();
        self.send(message.reply(Payload::ReadOk { messages }))
    }

    fn handle_topology(&self, message: &Message, topology: &TopologyMap) -> RippleResult<()> {
        let count = self.inner.topology.set_neighbors(&self.inner.id, topology);
        self.inner
            .counters
            .topology_updates
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!(node = %self.inner.id, neighbors = ?self.neighbors(), "topology installed ({} neighbors)", count);
        self.send(message.reply(Payload::TopologyOk))
    }

    /// A repeated `init` is fine; a different identity is not recoverable.
    fn handle_reinit(&self, message: &Message, node_id: &NodeId) -> RippleResult<()> {
        if node_id != &self.inner.id {
            return Err(RippleError::Invariant(format!(
                "node {} re-initialized as {}",
                self.inner.id, node_id
            )));
        }
        self.send(message.reply(Payload::InitOk))
    }

    /// Answer `message` with an error, if its sender is waiting
    pub fn reject(&self, message: &Message, err: &RippleError) -> RippleResult<()> {
        self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(from = %message.src, "rejecting request: {}", err);
        if !message.expects_reply() {
            return Ok(());
        }
        self.send(message.error_reply(err))
    }

    /// Count a request that failed to decode
    pub fn record_rejected(&self) {
        self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Where this node's envelopes go
    pub fn outbox(&self) -> &dyn Outbox {
        self.inner.outbox.as_ref()
    }

    fn send(&self, message: Message) -> RippleResult<()> {
        self.inner.outbox.send(message)
    }

    /// Number of values still being disseminated
    pub fn gossip_in_flight(&self) -> usize {
        self.inner.gossip.in_flight()
    }

    pub fn stats(&self) -> RuntimeStats {
        let c = &self.inner.counters;
        RuntimeStats {
            accepted: c.accepted.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            reads: c.reads.load(Ordering::Relaxed),
            topology_updates: c.topology_updates.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            diffusion: self.inner.gossip.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::{ErrorCode, MsgId};
    use ripple_transport::{ChannelOutbox, OutboxReceiver};
    use ripple_wire::Body;
    use std::collections::HashMap;
    use std::time::Duration;

    fn node(id: &str) -> (Node, OutboxReceiver) {
        let (outbox, rx) = ChannelOutbox::new();
        let config = NodeConfig::default().with_retry_interval(Duration::from_millis(50));
        let cluster = vec![NodeId::from("n1"), NodeId::from("n2"), NodeId::from("n3")];
        (
            Node::new(NodeId::from(id), cluster, Arc::new(outbox), &config),
            rx,
        )
    }

    fn request(src: &str, dest: &str, msg_id: Option<u64>, payload: Payload) -> Message {
        Message {
            src: NodeId::from(src),
            dest: NodeId::from(dest),
            body: Body {
                msg_id: msg_id.map(MsgId::new),
                in_reply_to: None,
                payload,
            },
        }
    }

    fn broadcast(v: i64) -> Payload {
        Payload::Broadcast {
            message: Value::new(v),
        }
    }

    fn line_topology() -> Payload {
        let mut topology = HashMap::new();
        topology.insert(NodeId::from("n1"), vec![NodeId::from("n2")]);
        topology.insert(
            NodeId::from("n2"),
            vec![NodeId::from("n1"), NodeId::from("n3")],
        );
        topology.insert(NodeId::from("n3"), vec![NodeId::from("n2")]);
        Payload::Topology { topology }
    }

    #[tokio::test]
    async fn test_client_write_replies_and_stores() {
        let (node, mut rx) = node("n1");
        node.handle(request("c1", "n1", Some(1), broadcast(42))).unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.dest, NodeId::from("c1"));
        assert_eq!(reply.body.in_reply_to, Some(MsgId::new(1)));
        assert_eq!(reply.body.payload, Payload::BroadcastOk);
        assert_eq!(node.values(), vec![Value::new(42)]);
    }

    #[tokio::test]
    async fn test_duplicate_write_applied_once() {
        let (node, mut rx) = node("n1");
        node.handle(request("c1", "n1", Some(1), broadcast(5))).unwrap();
        node.handle(request("c2", "n1", Some(1), broadcast(5))).unwrap();

        // Both clients are answered
        assert_eq!(rx.recv().await.unwrap().body.payload, Payload::BroadcastOk);
        assert_eq!(rx.recv().await.unwrap().body.payload, Payload::BroadcastOk);

        let stats = node.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(node.values().len(), 1);
    }

    #[tokio::test]
    async fn test_peer_gossip_without_msg_id_is_not_answered() {
        let (node, mut rx) = node("n3");
        node.handle(request("n2", "n3", None, broadcast(9))).unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(node.values(), vec![Value::new(9)]);
    }

    #[tokio::test]
    async fn test_peer_gossip_with_msg_id_is_acknowledged() {
        let (node, mut rx) = node("n3");
        node.handle(request("n2", "n3", Some(17), broadcast(9))).unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.dest, NodeId::from("n2"));
        assert_eq!(reply.body.in_reply_to, Some(MsgId::new(17)));
        assert_eq!(reply.body.payload, Payload::BroadcastOk);
    }

    #[tokio::test]
    async fn test_read_returns_snapshot() {
        let (node, mut rx) = node("n1");
        for v in [3, 1, 2] {
            node.handle(request("n2", "n1", None, broadcast(v))).unwrap();
        }
        node.handle(request("c1", "n1", Some(4), Payload::Read)).unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(
            reply.body.payload,
            Payload::ReadOk {
                messages: vec![Value::new(1), Value::new(2), Value::new(3)]
            }
        );
    }

    #[tokio::test]
    async fn test_topology_installs_neighbors_and_replies() {
        let (node, mut rx) = node("n2");
        node.handle(request("c1", "n2", Some(1), line_topology())).unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.body.payload, Payload::TopologyOk);
        assert_eq!(reply.body.in_reply_to, Some(MsgId::new(1)));
        assert_eq!(node.neighbors(), vec![NodeId::from("n1"), NodeId::from("n3")]);
    }

    #[tokio::test]
    async fn test_new_value_is_gossiped_except_to_sender() {
        let (node, mut rx) = node("n2");
        node.handle(request("c1", "n2", Some(1), line_topology())).unwrap();
        let _topology_ok = rx.recv().await.unwrap();

        node.handle(request("n1", "n2", Some(8), broadcast(42))).unwrap();

        let mut gossip = Vec::new();
        let mut acked = false;
        while gossip.is_empty() || !acked {
            let out = rx.recv().await.unwrap();
            if matches!(out.body.payload, Payload::Broadcast { .. }) {
                gossip.push(out);
            } else {
                assert_eq!(out.dest, NodeId::from("n1"));
                assert_eq!(out.body.payload, Payload::BroadcastOk);
                acked = true;
            }
        }

        assert!(gossip.iter().all(|m| m.dest == NodeId::from("n3")));
        assert_eq!(node.gossip_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_isolated_node_never_gossips() {
        let (node, mut rx) = node("n9");
        node.handle(request("c1", "n9", Some(1), line_topology())).unwrap();
        node.handle(request("c1", "n9", Some(2), broadcast(1))).unwrap();

        assert_eq!(rx.recv().await.unwrap().body.payload, Payload::TopologyOk);
        assert_eq!(rx.recv().await.unwrap().body.payload, Payload::BroadcastOk);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(node.gossip_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_reply_payload_as_request_not_supported() {
        let (node, mut rx) = node("n1");
        node.handle(request("c1", "n1", Some(3), Payload::ReadOk { messages: vec![] }))
            .unwrap();

        let reply = rx.recv().await.unwrap();
        assert!(matches!(
            reply.body.payload,
            Payload::Error {
                code: ErrorCode::NotSupported,
                ..
            }
        ));
        assert_eq!(node.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_reinit_with_other_id_is_fatal() {
        let (node, mut rx) = node("n1");
        let same = Payload::Init {
            node_id: NodeId::from("n1"),
            node_ids: node.cluster().to_vec(),
        };
        node.handle(request("c0", "n1", Some(1), same)).unwrap();
        assert_eq!(rx.recv().await.unwrap().body.payload, Payload::InitOk);

        let other = Payload::Init {
            node_id: NodeId::from("n2"),
            node_ids: node.cluster().to_vec(),
        };
        let err = node.handle(request("c0", "n1", Some(2), other)).unwrap_err();
        assert!(err.is_fatal());
    }
}
