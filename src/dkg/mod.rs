//! The distributed key generation service.
//!
//! - [`state`]: per-node long-lived protocol state
//! - [`engine`]: the Pedersen setup and resharing round machines
//! - [`handler`]: per-stream message handling on each node
//! - [`node`]: node identity and the listening loop
//! - [`actor`]: the coordinator driving protocol operations

pub mod actor;
pub mod engine;
pub mod handler;
pub mod node;
pub mod state;
