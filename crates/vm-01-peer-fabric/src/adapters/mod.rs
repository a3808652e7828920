//! # Adapters Layer
//!
//! Concrete `PeerFabric` implementations.

pub mod local_mesh;

pub use local_mesh::{LocalMesh, LocalMeshNode};
