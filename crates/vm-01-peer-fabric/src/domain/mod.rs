//! # Domain Layer
//!
//! Pure logic of the fabric adapter: deriving service endpoints from the
//! headers a peer advertises, and the error vocabulary of the port.

pub mod endpoint;
pub mod errors;

pub use endpoint::{derive_endpoint, Endpoint, PeerEndpoints};
pub use errors::FabricError;
