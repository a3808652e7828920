//! # ValueMesh Node
//!
//! Runs a single node until Ctrl+C.
//!
//! This is a single-node demo: the node sits on its own in-process
//! `LocalMesh`, so no other process can join it and the `ping` procedure
//! and value-entering logger only become reachable when `start_demo` is
//! given a fabric shared with other nodes (as the tests do).
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (TOML file named by `VM_CONFIG`, then env overrides)
//! 2. Start the node on an in-process fabric
//! 3. Register the `ping` procedure and a value-entering logger
//! 4. Wait for Ctrl+C, then shut down gracefully
//!
//! ## Environment
//!
//! | Variable               | Effect                          |
//! |------------------------|---------------------------------|
//! | `VM_CONFIG`            | path of a TOML config file      |
//! | `VM_NODE_NAME`         | node name                       |
//! | `VM_RPC_PORT`          | RPC server port                 |
//! | `VM_PUB_PORT`          | publisher port                  |
//! | `VM_SURVEY_TIMEOUT_MS` | default survey timeout          |
//! | `RUST_LOG`             | log filter (default `info`)     |

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use node_runtime::{Node, NodeConfig};
use vm_01_peer_fabric::{LocalMesh, PeerFabric};
use vm_04_rpc::procedure;

/// Parse an environment override, warning on garbage.
fn env_override<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

fn load_config() -> Result<NodeConfig> {
    let mut config = match std::env::var("VM_CONFIG") {
        Ok(path) => {
            let config = NodeConfig::load(&path).with_context(|| format!("loading {path}"))?;
            info!(path = %path, "Loaded configuration file");
            config
        }
        Err(_) => NodeConfig::default(),
    };

    if let Ok(name) = std::env::var("VM_NODE_NAME") {
        config.name = name;
    }
    if let Some(port) = env_override("VM_RPC_PORT") {
        config.rpc.port = port;
    }
    if let Some(port) = env_override("VM_PUB_PORT") {
        config.pubsub.port = port;
    }
    if let Some(ms) = env_override("VM_SURVEY_TIMEOUT_MS") {
        config.survey.default_timeout = Duration::from_millis(ms);
    }

    Ok(config)
}

/// Start a node on `fabric` with the `ping` procedure and a value-entering logger.
async fn start_demo(fabric: Arc<dyn PeerFabric>, config: NodeConfig) -> Result<Node> {
    let node = Node::start(fabric, config).await.context("starting node")?;

    let ping = node.add_rpc(
        "ping",
        procedure(|args, kwargs| async move { Ok(json!(["PONG!", args, kwargs])) }),
    )?;
    info!(uri = %ping, "Registered procedure");

    node.register_value_entering(|peer, uri| {
        info!(peer = %peer, uri = %uri, "Value entered the mesh");
    });
    Ok(node)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config()?;

    info!("===========================================");
    info!("  ValueMesh Node v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let mesh = LocalMesh::new();
    let fabric = Arc::new(mesh.node(config.name.clone()));
    let node = start_demo(fabric, config).await?;

    info!(
        node = %node.name(),
        rpc_port = node.rpc_port(),
        pub_port = node.pub_port(),
        "Node is running. Press Ctrl+C to stop."
    );
    tokio::signal::ctrl_c().await?;

    node.shutdown().await;
    Ok(())
}
