//! Multi-node fixtures.

use node_runtime::{Node, NodeConfig};
use std::sync::Arc;
use std::time::Duration;
use vm_01_peer_fabric::LocalMesh;

/// How long fixtures wait for peers to finish connecting.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Nodes sharing one in-process mesh.
pub struct TestCluster {
    pub mesh: LocalMesh,
    pub nodes: Vec<Node>,
}

impl TestCluster {
    /// Start one node per name and wait until every node sees all others.
    ///
    /// # Panics
    ///
    /// If a node fails to start or the mesh does not converge in time.
    pub async fn start(names: &[&str]) -> Self {
        let mesh = LocalMesh::new();
        let mut nodes = Vec::with_capacity(names.len());
        for name in names {
            nodes.push(start_node(&mesh, name).await);
        }
        let cluster = Self { mesh, nodes };
        cluster.wait_connected().await;
        cluster
    }

    /// Add a node to the running mesh and wait for it to converge.
    pub async fn join(&mut self, name: &str) -> Node {
        let node = start_node(&self.mesh, name).await;
        self.nodes.push(node.clone());
        self.wait_connected().await;
        node
    }

    async fn wait_connected(&self) {
        let others = self.nodes.len().saturating_sub(1);
        for node in &self.nodes {
            assert!(
                node.wait_for_peers(others, CONNECT_TIMEOUT).await,
                "{} did not connect to {others} peers",
                node.name()
            );
        }
    }

    #[must_use]
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub async fn shutdown(self) {
        for node in &self.nodes {
            node.shutdown().await;
        }
    }
}

async fn start_node(mesh: &LocalMesh, name: &str) -> Node {
    let fabric = Arc::new(mesh.node(name));
    match Node::start(fabric, NodeConfig::for_testing(name)).await {
        Ok(node) => node,
        Err(e) => panic!("failed to start {name}: {e}"),
    }
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
