//! Ripple Diffusion
//!
//! Reliable propagation of broadcast values over an externally assigned
//! topology.
//!
//! # Pieces
//!
//! - Seen set: which values this node has accepted (applied at most once)
//! - Topology store: this node's neighbors
//! - Disseminator: per-value retry loop that keeps sending a value to
//!   every neighbor until each one acknowledges it
//!
//! # Delivery
//!
//! Delivery is at-least-once and eventual. There is no ordering across
//! values and no coordinator; a value reaches the whole cluster because
//! every node that accepts it keeps re-sending it to its own neighbors.

pub mod gossip;
pub mod seen;
pub mod stats;
pub mod topology;

pub use gossip::*;
pub use seen::*;
pub use stats::*;
pub use topology::*;
