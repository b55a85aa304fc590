//! Topology layouts for cluster scenarios
//!
//! Every layout names its nodes `n1..=nN` and is symmetric: if `a` lists
//! `b` as a neighbor then `b` lists `a`.

use std::collections::{HashSet, VecDeque};

use ripple_core::NodeId;
use ripple_diffusion::TopologyMap;

/// Node ids `n1..=nN`
pub fn node_ids(count: usize) -> Vec<NodeId> {
    (1..=count).map(|i| NodeId::new(format!("n{i}"))).collect()
}

/// Empty adjacency for `count` nodes
fn empty(count: usize) -> TopologyMap {
    node_ids(count).into_iter().map(|id| (id, Vec::new())).collect()
}

fn link(map: &mut TopologyMap, a: &NodeId, b: &NodeId) {
    if a == b {
        return;
    }
    for (from, to) in [(a, b), (b, a)] {
        let entry = map.entry(from.clone()).or_default();
        if !entry.contains(to) {
            entry.push(to.clone());
        }
    }
}

/// n1 - n2 - ... - nN
pub fn line(count: usize) -> TopologyMap {
    let ids = node_ids(count);
    let mut map = empty(count);
    for pair in ids.windows(2) {
        link(&mut map, &pair[0], &pair[1]);
    }
    map
}

/// A line whose ends are joined
pub fn ring(count: usize) -> TopologyMap {
    let ids = node_ids(count);
    let mut map = line(count);
    if count > 2 {
        link(&mut map, &ids[0], &ids[count - 1]);
    }
    map
}

/// n1 at the center, everyone else a leaf
pub fn star(count: usize) -> TopologyMap {
    let ids = node_ids(count);
    let mut map = empty(count);
    for leaf in ids.iter().skip(1) {
        link(&mut map, &ids[0], leaf);
    }
    map
}

/// Breadth-first tree rooted at n1, each node with at most `fanout` children
pub fn tree(count: usize, fanout: usize) -> TopologyMap {
    let ids = node_ids(count);
    let mut map = empty(count);
    let fanout = fanout.max(1);
    for (index, child) in ids.iter().enumerate().skip(1) {
        let parent = (index - 1) / fanout;
        link(&mut map, &ids[parent], child);
    }
    map
}

/// Nodes laid out row by row on a square grid, linked to their
/// horizontal and vertical neighbors
pub fn grid(count: usize) -> TopologyMap {
    let ids = node_ids(count);
    let mut map = empty(count);
    let width = (count as f64).sqrt().ceil().max(1.0) as usize;
    for (index, id) in ids.iter().enumerate() {
        if (index + 1) % width != 0 && index + 1 < count {
            link(&mut map, id, &ids[index + 1]);
        }
        if index + width < count {
            link(&mut map, id, &ids[index + width]);
        }
    }
    map
}

/// Every node linked to every other node
pub fn mesh(count: usize) -> TopologyMap {
    let ids = node_ids(count);
    let mut map = empty(count);
    for (i, a) in ids.iter().enumerate() {
        for b in ids.iter().skip(i + 1) {
            link(&mut map, a, b);
        }
    }
    map
}

/// Add a node with no neighbors
pub fn with_isolated(mut map: TopologyMap, id: impl Into<NodeId>) -> TopologyMap {
    map.insert(id.into(), Vec::new());
    map
}

/// Check that every node can reach every other node
pub fn is_connected(map: &TopologyMap) -> bool {
    let Some(start) = map.keys().next() else {
        return true;
    };

    let mut visited: HashSet<&NodeId> = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        for next in map.get(current).into_iter().flatten() {
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }

    visited.len() == map.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn neighbors(map: &TopologyMap, id: &str) -> Vec<NodeId> {
        let mut list = map[&NodeId::from(id)].clone();
        list.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        list
    }

    fn is_symmetric(map: &TopologyMap) -> bool {
        map.iter()
            .all(|(a, list)| list.iter().all(|b| map[b].contains(a)))
    }

    #[test]
    fn test_line() {
        let map = line(3);
        assert_eq!(neighbors(&map, "n1"), vec![NodeId::from("n2")]);
        assert_eq!(
            neighbors(&map, "n2"),
            vec![NodeId::from("n1"), NodeId::from("n3")]
        );
        assert_eq!(neighbors(&map, "n3"), vec![NodeId::from("n2")]);
    }

    #[test]
    fn test_star() {
        let map = star(5);
        assert_eq!(map[&NodeId::from("n1")].len(), 4);
        assert_eq!(neighbors(&map, "n4"), vec![NodeId::from("n1")]);
    }

    #[test]
    fn test_tree_parents() {
        let map = tree(7, 2);
        assert_eq!(
            neighbors(&map, "n1"),
            vec![NodeId::from("n2"), NodeId::from("n3")]
        );
        assert_eq!(
            neighbors(&map, "n2"),
            vec![NodeId::from("n1"), NodeId::from("n4"), NodeId::from("n5")]
        );
        assert_eq!(neighbors(&map, "n7"), vec![NodeId::from("n3")]);
    }

    #[test]
    fn test_grid_3x3() {
        let map = grid(9);
        // Center
        assert_eq!(map[&NodeId::from("n5")].len(), 4);
        // Corner
        assert_eq!(
            neighbors(&map, "n1"),
            vec![NodeId::from("n2"), NodeId::from("n4")]
        );
        // Right edge does not wrap
        assert!(!map[&NodeId::from("n3")].contains(&NodeId::from("n4")));
    }

    #[test]
    fn test_isolated_node_disconnects() {
        let map = with_isolated(line(3), "n4");
        assert!(map[&NodeId::from("n4")].is_empty());
        assert!(!is_connected(&map));
    }

    proptest! {
        #[test]
        fn prop_layouts_are_symmetric_and_connected(count in 1usize..30, fanout in 1usize..5) {
            for map in [line(count), ring(count), star(count), tree(count, fanout), grid(count), mesh(count)] {
                prop_assert_eq!(map.len(), count);
                prop_assert!(is_symmetric(&map));
                prop_assert!(is_connected(&map));
                prop_assert!(map.iter().all(|(id, list)| !list.contains(id)));
            }
        }
    }
}
