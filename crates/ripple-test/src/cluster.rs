//! Cluster harness
//!
//! Starts one real node event loop per topology entry on a [`SimNetwork`],
//! bootstraps them the way a test driver would (`init`, then `topology`),
//! and drives them through a client.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use ripple_core::{ErrorCode, NodeId, RippleError, RippleResult, Value};
use ripple_diffusion::TopologyMap;
use ripple_runtime::{serve, NodeConfig};
use ripple_transport::{Correlator, Outbox};
use ripple_wire::Payload;

use crate::{ChaosConfig, SimNetwork};

/// Client id used by [`Cluster`]
pub const CLIENT_ID: &str = "c1";

/// How long a client waits for any single reply
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Seed used when none is given
pub const DEFAULT_SEED: u64 = 0x5EED;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Harness errors
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("{dest} did not answer within {after:?}")]
    Timeout { dest: NodeId, after: Duration },

    #[error("{dest} answered with error {code:?}: {text}")]
    Rejected {
        dest: NodeId,
        code: ErrorCode,
        text: String,
    },

    #[error("{dest} answered with unexpected {kind}")]
    Unexpected { dest: NodeId, kind: &'static str },

    #[error("node {node} crashed: {reason}")]
    Crashed { node: NodeId, reason: String },

    #[error(transparent)]
    Node(#[from] RippleError),
}

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

/// A client talking to nodes over the simulated network
pub struct Client {
    id: NodeId,
    rpc: Arc<Correlator>,
    outbox: Arc<dyn Outbox>,
    timeout: Duration,
    pump: JoinHandle<()>,
}

impl Client {
    /// Register `id` on the network and start resolving its replies
    pub fn connect(id: NodeId, network: &SimNetwork, timeout: Duration) -> Self {
        let mut mailbox = network.add_client(id.clone());
        let rpc = Correlator::new();

        let pump = tokio::spawn({
            let rpc = Arc::clone(&rpc);
            async move {
                while let Some(reply) = mailbox.recv().await {
                    rpc.resolve(reply);
                }
            }
        });

        Client {
            id,
            rpc,
            outbox: network.outbox(),
            timeout,
            pump,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Send a request and wait for its reply. `error` replies become errors.
    pub async fn call(&self, dest: &NodeId, payload: Payload) -> HarnessResult<Payload> {
        let pending = self.rpc.call(
            self.outbox.as_ref(),
            self.id.clone(),
            dest.clone(),
            payload,
        )?;

        let reply = tokio::time::timeout(self.timeout, pending)
            .await
            .map_err(|_| HarnessError::Timeout {
                dest: dest.clone(),
                after: self.timeout,
            })??;

        match reply.body.payload {
            Payload::Error { code, text } => Err(HarnessError::Rejected {
                dest: dest.clone(),
                code,
                text,
            }),
            payload => Ok(payload),
        }
    }

    pub async fn init(&self, dest: &NodeId, cluster: &[NodeId]) -> HarnessResult<()> {
        let payload = Payload::Init {
            node_id: dest.clone(),
            node_ids: cluster.to_vec(),
        };
        match self.call(dest, payload).await? {
            Payload::InitOk => Ok(()),
            other => Err(unexpected(dest, &other)),
        }
    }

    pub async fn topology(&self, dest: &NodeId, topology: &TopologyMap) -> HarnessResult<()> {
        let payload = Payload::Topology {
            topology: topology.clone(),
        };
        match self.call(dest, payload).await? {
            Payload::TopologyOk => Ok(()),
            other => Err(unexpected(dest, &other)),
        }
    }

    pub async fn broadcast(&self, dest: &NodeId, value: Value) -> HarnessResult<()> {
        match self.call(dest, Payload::Broadcast { message: value }).await? {
            Payload::BroadcastOk => Ok(()),
            other => Err(unexpected(dest, &other)),
        }
    }

    /// Values `dest` has accepted, sorted
    pub async fn read(&self, dest: &NodeId) -> HarnessResult<Vec<Value>> {
        match self.call(dest, Payload::Read).await? {
            Payload::ReadOk { mut messages } => {
                messages.sort();
                Ok(messages)
            }
            other => Err(unexpected(dest, &other)),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn unexpected(dest: &NodeId, payload: &Payload) -> HarnessError {
    HarnessError::Unexpected {
        dest: dest.clone(),
        kind: payload.kind(),
    }
}

/// A running cluster of nodes
pub struct Cluster {
    layout: TopologyMap,
    ids: Vec<NodeId>,
    client: Client,
    servers: HashMap<NodeId, JoinHandle<RippleResult<()>>>,
    network: SimNetwork,
}

impl Cluster {
    /// Start and bootstrap one node per entry of `layout`
    pub async fn start(
        layout: TopologyMap,
        chaos: ChaosConfig,
        config: NodeConfig,
    ) -> HarnessResult<Self> {
        Self::start_seeded(layout, chaos, config, DEFAULT_SEED).await
    }

    pub async fn start_seeded(
        layout: TopologyMap,
        chaos: ChaosConfig,
        config: NodeConfig,
        seed: u64,
    ) -> HarnessResult<Self> {
        config.validate()?;

        let network = SimNetwork::start(chaos, seed);

        let mut ids: Vec<NodeId> = layout.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        let mut servers = HashMap::with_capacity(ids.len());
        for id in &ids {
            let inbox = network.add_node(id.clone(), config.inbound_buffer);
            let server = tokio::spawn(serve(inbox, network.outbox(), config.clone()));
            servers.insert(id.clone(), server);
        }

        let client = Client::connect(NodeId::from(CLIENT_ID), &network, DEFAULT_CALL_TIMEOUT);

        for id in &ids {
            client.init(id, &ids).await?;
        }
        for id in &ids {
            client.topology(id, &layout).await?;
        }

        tracing::debug!(nodes = ids.len(), "cluster started");

        Ok(Cluster {
            layout,
            ids,
            client,
            servers,
            network,
        })
    }

    /// Node ids, sorted
    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn layout(&self) -> &TopologyMap {
        &self.layout
    }

    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn broadcast(
        &self,
        node: impl Into<NodeId>,
        value: Value,
    ) -> HarnessResult<()> {
        self.client.broadcast(&node.into(), value).await
    }

    pub async fn read(&self, node: impl Into<NodeId>) -> HarnessResult<Vec<Value>> {
        self.client.read(&node.into()).await
    }

    /// Read every node
    pub async fn read_all(&self) -> HarnessResult<HashMap<NodeId, Vec<Value>>> {
        let mut reads = HashMap::with_capacity(self.ids.len());
        for id in &self.ids {
            reads.insert(id.clone(), self.client.read(id).await?);
        }
        Ok(reads)
    }

    /// Poll until each of `nodes` holds exactly `expected`.
    ///
    /// Returns false if that does not happen within `timeout`.
    pub async fn wait_for(
        &self,
        nodes: &[NodeId],
        expected: &[Value],
        timeout: Duration,
    ) -> HarnessResult<bool> {
        let expected: BTreeSet<Value> = expected.iter().copied().collect();
        let deadline = Instant::now() + timeout;

        loop {
            let mut settled = true;
            for id in nodes {
                let held: BTreeSet<Value> = self.client.read(id).await?.into_iter().collect();
                if held != expected {
                    settled = false;
                    break;
                }
            }

            if settled {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Poll until every node holds exactly `expected`
    pub async fn wait_for_convergence(
        &self,
        expected: &[Value],
        timeout: Duration,
    ) -> HarnessResult<bool> {
        self.wait_for(&self.ids, expected, timeout).await
    }

    /// Close every inbox and wait for the event loops to stop
    pub async fn shutdown(mut self) -> HarnessResult<()> {
        self.network.disconnect_all();

        for (node, server) in self.servers.drain() {
            match server.await {
                Ok(result) => result?,
                Err(e) => {
                    return Err(HarnessError::Crashed {
                        node,
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}
