//! Ripple Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout the ripple node:
//! - Identifiers (NodeId, MsgId)
//! - Broadcast values
//! - Protocol error codes
//! - The error taxonomy shared by every layer

pub mod code;
pub mod error;
pub mod id;
pub mod value;

pub use code::*;
pub use error::*;
pub use id::*;
pub use value::*;
