use serde_json::Value;

/// Processes one named event kind received from peers.
///
/// Handlers run on the node's fabric loop and must not block; fan-out to
/// application code goes through an `Observable`.
pub trait EventHandler: Send + Sync {
    /// Registry key, also the `event_name` field on the wire.
    fn name(&self) -> &str;

    fn process_event(&self, peer_name: &str, data: Value);
}
