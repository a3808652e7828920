use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames sent from a publisher to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PubSubFrame {
    /// The connection is registered; later publishes will be delivered.
    Ready,
    /// One published message.
    Message { topic: String, data: Value },
}

impl PubSubFrame {
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
