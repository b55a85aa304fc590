//! Ripple Transport Layer - envelope delivery and correlation
//!
//! This crate provides:
//! - The `Outbox` seam every outbound envelope goes through
//! - Stdio line transport (one JSON envelope per line)
//! - Request/response correlation for outbound RPCs

pub mod outbox;
pub mod rpc;
pub mod stdio;

pub use outbox::*;
pub use rpc::*;
pub use stdio::*;
