//! Ripple Runtime - Node orchestration and main loop
//!
//! This crate implements the per-node event loop:
//! 1. Wait for `init` and build the node
//! 2. Route replies to the correlation table
//! 3. Dispatch each request on its own task
//!    (`broadcast`, `read`, `topology`)
//! 4. Answer malformed or unsupported requests with an error body
//! 5. Stop on end of input or on a fatal error

pub mod config;
pub mod logging;
pub mod node;
pub mod server;

pub use config::*;
pub use node::*;
pub use server::*;
