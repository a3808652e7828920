//! Error types for the peer messaging fabric.

use shared_types::PeerId;
use thiserror::Error;

/// Errors surfaced by a `PeerFabric` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FabricError {
    /// The peer is not (or no longer) present on the fabric.
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// `shout`/`whisper` were used before `start`.
    #[error("Fabric node has not been started")]
    NotStarted,

    /// `start` was called twice.
    #[error("Fabric node is already started")]
    AlreadyStarted,

    /// The node left the fabric.
    #[error("Fabric node has been stopped")]
    Stopped,

    /// A fabric address or endpoint string could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A peer did not advertise a header the runtime needs.
    #[error("Peer {peer} did not advertise header '{key}'")]
    MissingHeader { peer: String, key: String },
}
