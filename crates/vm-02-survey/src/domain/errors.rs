//! Survey engine errors.

use shared_types::CodecError;
use thiserror::Error;
use vm_01_peer_fabric::FabricError;

#[derive(Debug, Error)]
pub enum SurveyError {
    /// No handler is registered under this name.
    #[error("Unknown survey: {0}")]
    UnknownSurvey(String),

    /// The broadcast could not be sent.
    #[error("Fabric error: {0}")]
    Fabric(#[from] FabricError),

    /// The request could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
