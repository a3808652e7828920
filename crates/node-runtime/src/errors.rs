//! Error types surfaced by the node runtime.

use crate::container::ConfigError;
use thiserror::Error;
use vm_01_peer_fabric::FabricError;
use vm_02_survey::SurveyError;
use vm_03_event::EventError;
use vm_04_rpc::RpcError;
use vm_05_pubsub::PubSubError;

/// Failures of node-level operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fabric error: {0}")]
    Fabric(#[from] FabricError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Pub/sub error: {0}")]
    PubSub(#[from] PubSubError),

    #[error("Survey error: {0}")]
    Survey(#[from] SurveyError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// The URI does not have the `rpc://<peer>/<procedure>` shape.
    #[error("Invalid RPC URI: {0}")]
    InvalidRpcUri(String),

    #[error("Node is shut down")]
    ShutDown,
}

/// Failures of shared-value operations.
#[derive(Debug, Error)]
pub enum ValueError {
    /// No peer answered the history survey for this URI.
    #[error("No peer can provide history for {uri}")]
    NoPeerWithHistory { uri: String },

    /// A history point returned by a peer did not have the `[value, ts, tags]` shape.
    #[error("Malformed history from {peer}: {reason}")]
    MalformedHistory { peer: String, reason: String },

    #[error(transparent)]
    Node(#[from] NodeError),
}

impl From<RpcError> for ValueError {
    fn from(err: RpcError) -> Self {
        Self::Node(NodeError::Rpc(err))
    }
}

impl From<PubSubError> for ValueError {
    fn from(err: PubSubError) -> Self {
        Self::Node(NodeError::PubSub(err))
    }
}

impl From<EventError> for ValueError {
    fn from(err: EventError) -> Self {
        Self::Node(NodeError::Event(err))
    }
}
