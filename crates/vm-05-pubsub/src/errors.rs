use thiserror::Error;

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Handshake with {address} failed: {reason}")]
    Handshake { address: String, reason: String },

    #[error("Publisher is shut down")]
    Closed,
}
