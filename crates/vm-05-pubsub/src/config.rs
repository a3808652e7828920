use std::time::Duration;

/// Pub/sub channel settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubConfig {
    /// Interface the publisher binds to.
    pub bind_address: String,
    /// Publisher port; 0 picks a free one.
    pub port: u16,
    /// Messages buffered per subscriber before it starts lagging.
    pub channel_capacity: usize,
    /// Largest accepted frame in bytes.
    pub max_frame_length: usize,
    /// How long `connect` waits for the publisher's READY frame.
    pub handshake_timeout: Duration,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 0,
            channel_capacity: 1024,
            max_frame_length: 16 * 1024 * 1024,
            handshake_timeout: Duration::from_secs(2),
        }
    }
}

impl PubSubConfig {
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            ..Self::default()
        }
    }
}
