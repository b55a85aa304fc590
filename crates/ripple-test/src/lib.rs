//! Ripple Test Harness - lossy networks and cluster scenarios
//!
//! This crate provides:
//! - Chaos links (loss, burst loss, duplication, jitter)
//! - Topology layouts (line, ring, star, tree, grid, mesh)
//! - An in-process network routing envelopes between real nodes
//! - A cluster harness with client calls and convergence checks

pub mod chaos;
pub mod cluster;
pub mod layout;
pub mod network;

pub use chaos::*;
pub use cluster::*;
pub use layout::*;
pub use network::*;
