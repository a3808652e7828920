//! # Ports Layer
//!
//! The contract the node runtime consumes from the group-messaging fabric.

pub mod outbound;

pub use outbound::{FabricEvent, FabricEvents, PeerFabric};
