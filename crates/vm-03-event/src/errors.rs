use shared_types::CodecError;
use thiserror::Error;
use vm_01_peer_fabric::FabricError;

/// Errors raised while sending an event.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Fabric error: {0}")]
    Fabric(#[from] FabricError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
