//! Ripple Wire Protocol - JSON envelopes
//!
//! This crate implements the line-oriented wire format:
//! - Envelope (src, dest, body)
//! - Body (correlation ids + typed payload)
//! - Two-stage decoding with typed rejections

pub mod body;
pub mod message;

pub use body::*;
pub use message::*;
