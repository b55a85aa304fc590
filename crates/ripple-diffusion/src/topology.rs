//! Topology store - this node's neighbors
//!
//! The neighbor list is installed from a cluster-wide adjacency map and
//! read by every dissemination round. Readers take a shared handle to a
//! whole list, so a concurrent update is seen either entirely or not at all.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use ripple_core::NodeId;

/// Cluster-wide adjacency map as carried by a `topology` request
pub type TopologyMap = HashMap<NodeId, Vec<NodeId>>;

/// Neighbor list for the local node
#[derive(Debug)]
pub struct TopologyStore {
    neighbors: RwLock<Arc<[NodeId]>>,
}

impl Default for TopologyStore {
    fn default() -> Self {
        Self {
            neighbors: RwLock::new(Arc::from(Vec::new())),
        }
    }
}

impl TopologyStore {
    /// Create an empty store (no neighbors: the node relays nothing)
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the neighbors assigned to `local` in `topology`.
    ///
    /// A missing entry installs an empty list. Repeated entries and the
    /// local id itself are dropped. Returns the installed neighbor count.
    pub fn set_neighbors(&self, local: &NodeId, topology: &TopologyMap) -> usize {
        let mut unique = HashSet::new();
        let list: Vec<NodeId> = topology
            .get(local)
            .map(|peers| {
                peers
                    .iter()
                    .filter(|peer| *peer != local && unique.insert(*peer))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let count = list.len();
        *self.neighbors.write() = Arc::from(list);
        count
    }

    /// Current neighbor list
    pub fn neighbors(&self) -> Arc<[NodeId]> {
        Arc::clone(&self.neighbors.read())
    }

    pub fn len(&self) -> usize {
        self.neighbors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.read().is_empty()
    }
}
