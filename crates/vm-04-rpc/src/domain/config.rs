/// RPC transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    /// Interface the server binds to.
    pub bind_address: String,
    /// Server port; 0 picks a free one.
    pub port: u16,
    /// Calls executing at once across all connections.
    pub max_in_flight: usize,
    /// Largest accepted frame in bytes.
    pub max_frame_length: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 0,
            max_in_flight: 1024,
            max_frame_length: 16 * 1024 * 1024,
        }
    }
}

impl RpcConfig {
    /// Loopback, ephemeral port.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            max_in_flight: 64,
            ..Self::default()
        }
    }
}
