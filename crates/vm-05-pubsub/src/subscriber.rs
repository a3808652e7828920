use crate::config::PubSubConfig;
use crate::errors::PubSubError;
use crate::frame::PubSubFrame;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use shared_types::PeerId;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};

/// Receives `(topic, data)` for every message matching a subscription.
pub type MessageHandler = Arc<dyn Fn(&str, Value) + Send + Sync>;

/// Subscribing side: one connection per peer publisher, one shared
/// topic filter.
pub struct Subscriber {
    topics: Arc<RwLock<BTreeSet<String>>>,
    connections: Mutex<HashMap<PeerId, JoinHandle<()>>>,
    handler: MessageHandler,
    config: PubSubConfig,
}

impl Subscriber {
    #[must_use]
    pub fn new(config: PubSubConfig, handler: MessageHandler) -> Self {
        Self {
            topics: Arc::new(RwLock::new(BTreeSet::new())),
            connections: Mutex::new(HashMap::new()),
            handler,
            config,
        }
    }

    /// Deliver messages whose topic starts with `prefix`.
    pub fn subscribe(&self, prefix: &str) {
        if self.topics.write().insert(prefix.to_string()) {
            info!(topic = prefix, "Subscribing");
        }
    }

    pub fn unsubscribe(&self, prefix: &str) -> bool {
        self.topics.write().remove(prefix)
    }

    #[must_use]
    pub fn is_subscribed(&self, topic: &str) -> bool {
        matches(&self.topics.read(), topic)
    }

    /// Connect to a peer's publisher. Returns once the publisher has
    /// acknowledged the connection.
    pub async fn connect(&self, peer: PeerId, peer_name: &str, address: &str) -> Result<(), PubSubError> {
        let handshake_failed = |reason: String| PubSubError::Handshake {
            address: address.to_string(),
            reason,
        };

        let stream = TcpStream::connect(address).await?;
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(self.config.max_frame_length)
            .new_codec();
        let mut framed = Framed::new(stream, codec);

        let first = tokio::time::timeout(self.config.handshake_timeout, framed.next())
            .await
            .map_err(|_| handshake_failed("timed out".to_string()))?;
        match first {
            Some(Ok(bytes)) if PubSubFrame::from_bytes(&bytes).ok() == Some(PubSubFrame::Ready) => {}
            Some(Ok(_)) => return Err(handshake_failed("unexpected first frame".to_string())),
            Some(Err(e)) => return Err(e.into()),
            None => return Err(handshake_failed("closed during handshake".to_string())),
        }

        let task = tokio::spawn(read_loop(
            framed,
            peer_name.to_string(),
            self.topics.clone(),
            self.handler.clone(),
        ));
        if let Some(previous) = self.connections.lock().insert(peer, task) {
            previous.abort();
        }
        info!(peer = peer_name, address, "Pub/sub channel to peer established");
        Ok(())
    }

    /// Drop the connection to a peer's publisher.
    pub fn disconnect(&self, peer: PeerId) -> bool {
        match self.connections.lock().remove(&peer) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.connections
            .lock()
            .get(&peer)
            .is_some_and(|task| !task.is_finished())
    }

    pub fn close_all(&self) {
        for (_, task) in self.connections.lock().drain() {
            task.abort();
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("topics", &*self.topics.read())
            .field("connections", &self.connections.lock().len())
            .finish()
    }
}

fn matches(topics: &BTreeSet<String>, topic: &str) -> bool {
    topics.iter().any(|prefix| topic.starts_with(prefix.as_str()))
}

async fn read_loop(
    mut framed: Framed<TcpStream, LengthDelimitedCodec>,
    peer_name: String,
    topics: Arc<RwLock<BTreeSet<String>>>,
    handler: MessageHandler,
) {
    while let Some(frame) = framed.next().await {
        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(peer = %peer_name, error = %e, "Pub/sub read failed");
                break;
            }
        };
        match PubSubFrame::from_bytes(&bytes) {
            Ok(PubSubFrame::Message { topic, data }) => {
                if matches(&topics.read(), &topic) {
                    handler(&topic, data);
                }
            }
            Ok(PubSubFrame::Ready) => {}
            Err(e) => warn!(peer = %peer_name, error = %e, "Dropping malformed pub/sub frame"),
        }
    }
    debug!(peer = %peer_name, "Pub/sub channel closed");
}
