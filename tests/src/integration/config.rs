//! # Configuration Files
//!
//! Loading node configuration from disk and starting a node with it.

#[cfg(test)]
mod tests {
    use node_runtime::{ConfigError, Node, NodeConfig};
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;
    use vm_01_peer_fabric::LocalMesh;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
            [node]
            name = "cellar"
            shutdown_grace_ms = 5

            [rpc]
            bind_address = "127.0.0.1"
            max_in_flight = 8

            [pubsub]
            bind_address = "127.0.0.1"
            handshake_timeout_ms = 250

            [survey]
            timeout_ms = 150
            "#,
        );

        let config = NodeConfig::load(file.path()).unwrap();
        assert_eq!(config.name, "cellar");
        assert_eq!(config.shutdown_grace, Duration::from_millis(5));
        assert_eq!(config.rpc.bind_address, "127.0.0.1");
        assert_eq!(config.rpc.max_in_flight, 8);
        assert_eq!(config.pubsub.handshake_timeout, Duration::from_millis(250));
        assert_eq!(config.survey.default_timeout, Duration::from_millis(150));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let file = write_config("[node\nname = ");
        assert!(matches!(NodeConfig::load(file.path()), Err(ConfigError::Parse(_))));

        let file = write_config("[storage]\npath = \"/tmp\"");
        assert!(matches!(NodeConfig::load(file.path()), Err(ConfigError::Parse(_))));
    }

    #[tokio::test]
    async fn test_node_starts_with_loaded_config() {
        let file = write_config(
            "[node]\nname = \"loaded\"\n[rpc]\nbind_address = \"127.0.0.1\"\n[pubsub]\nbind_address = \"127.0.0.1\"\n",
        );
        let config = NodeConfig::load(file.path()).unwrap();

        let mesh = LocalMesh::new();
        let node = Node::start(Arc::new(mesh.node(config.name.clone())), config)
            .await
            .unwrap();
        assert_eq!(node.name(), "loaded");
        assert_ne!(node.rpc_port(), 0);
        assert_ne!(node.pub_port(), 0);
        node.shutdown().await;
    }
}
