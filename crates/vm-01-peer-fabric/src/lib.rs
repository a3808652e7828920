//! # Peer Messaging Fabric
//!
//! **Subsystem ID:** 1
//!
//! This crate defines the contract the node runtime consumes from the
//! group-messaging transport (peer enter/exit, group broadcast "shout",
//! unicast "whisper", per-peer headers) and ships an in-process adapter.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** endpoint derivation from peer headers + fabric address
//! - **Ports Layer:** the `PeerFabric` trait and `FabricEvent` stream
//! - **Adapters Layer:** `LocalMesh`, an in-process group-messaging hub
//!
//! Peer liveness (beacons, heartbeats, expiry) belongs to the fabric
//! implementation and is never reimplemented by the runtime.
//!
//! ## Example
//!
//! ```rust
//! use vm_01_peer_fabric::{LocalMesh, PeerFabric, FabricEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mesh = LocalMesh::new();
//! let a = mesh.node("alpha");
//! let b = mesh.node("beta");
//! b.join("SURVEY");
//!
//! let mut a_events = a.start().unwrap();
//! let mut b_events = b.start().unwrap();
//!
//! a.shout("SURVEY", b"hello".to_vec()).unwrap();
//!
//! // beta first sees alpha entering, then the shout
//! assert!(matches!(b_events.recv().await, Some(FabricEvent::Enter { .. })));
//! assert!(matches!(b_events.recv().await, Some(FabricEvent::Shout { .. })));
//! # let _ = a_events.try_recv();
//! # }
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;

/// Test utilities (RecordingFabric).
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{LocalMesh, LocalMeshNode};
pub use domain::{derive_endpoint, Endpoint, FabricError, PeerEndpoints};
pub use ports::{FabricEvent, FabricEvents, PeerFabric};

#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::RecordingFabric;
