//! # Event Routing
//!
//! One task per node drains the fabric event stream. Handlers run inline
//! and must not block; connecting to a new peer is the only slow step and
//! gets its own task.

use crate::container::node::{NodeInner, PeerInfo};
use crate::registry::ValueRegistry;
use crate::value::UpdateOutcome;
use shared_types::{PeerId, EVENT_GROUP, SURVEY_GROUP};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vm_01_peer_fabric::{FabricEvent, FabricEvents, PeerEndpoints};
use vm_05_pubsub::MessageHandler;

/// Drain fabric events until shutdown, the stream closes, or the node is dropped.
pub async fn run_event_loop(
    node: Weak<NodeInner>,
    mut events: FabricEvents,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(node) = node.upgrade() else {
            break;
        };
        route(&node, event);
    }
    debug!("Fabric event loop stopped");
}

fn route(node: &Arc<NodeInner>, event: FabricEvent) {
    match event {
        FabricEvent::Enter {
            peer,
            name,
            headers,
            address,
        } => on_peer_enter(node, peer, name, &headers, &address),
        FabricEvent::Exit { peer, name } => on_peer_exit(node, peer, &name),
        FabricEvent::Shout {
            peer,
            name,
            group,
            payload,
        } => match group.as_str() {
            SURVEY_GROUP => node.surveys.on_request(peer, &name, &payload),
            EVENT_GROUP => node.events.on_event(peer, &name, &payload),
            other => debug!(peer = %name, group = other, "Ignoring shout on unknown group"),
        },
        FabricEvent::Whisper { name, payload, .. } => node.surveys.on_reply(&name, &payload),
    }
}

// =============================================================================
// PEER LIFECYCLE
// =============================================================================

fn on_peer_enter(
    node: &Arc<NodeInner>,
    peer: PeerId,
    name: String,
    headers: &HashMap<String, String>,
    address: &str,
) {
    let endpoints = match PeerEndpoints::from_headers(&name, headers, address) {
        Ok(endpoints) => Some(endpoints),
        Err(e) => {
            warn!(peer = %name, address, error = %e, "Peer does not advertise usable endpoints");
            None
        }
    };
    info!(peer = %name, %peer, address, "Peer entered");
    node.peers.write().insert(
        peer,
        PeerInfo {
            id: peer,
            name: name.clone(),
            endpoints: endpoints.clone(),
            connected: false,
        },
    );

    if let Some(endpoints) = endpoints {
        tokio::spawn(connect_peer(Arc::clone(node), peer, name, endpoints));
    }
}

async fn connect_peer(node: Arc<NodeInner>, peer: PeerId, name: String, endpoints: PeerEndpoints) {
    let rpc_address = endpoints.rpc.socket_addr();
    let pub_address = endpoints.publisher.socket_addr();
    let (rpc, pubsub) = tokio::join!(
        node.rpc_clients.connect(peer, &name, &rpc_address),
        node.subscriber.connect(peer, &name, &pub_address),
    );

    if let Err(e) = &rpc {
        warn!(peer = %name, address = %rpc_address, error = %e, "RPC connection to peer failed");
    }
    if let Err(e) = &pubsub {
        warn!(peer = %name, address = %pub_address, error = %e, "Pub/sub connection to peer failed");
    }

    let connected = rpc.is_ok() && pubsub.is_ok() && !*node.shutdown.borrow() && {
        let mut peers = node.peers.write();
        match peers.get_mut(&peer) {
            Some(info) => {
                info.connected = true;
                true
            }
            None => false,
        }
    };

    if connected {
        info!(peer = %name, "Peer connected");
        node.refresh_ready_count();
    } else {
        node.rpc_clients.disconnect(peer, &name);
        node.subscriber.disconnect(peer);
    }
}

fn on_peer_exit(node: &Arc<NodeInner>, peer: PeerId, name: &str) {
    let known = node.peers.write().remove(&peer).is_some();
    node.rpc_clients.disconnect(peer, name);
    node.subscriber.disconnect(peer);
    node.refresh_ready_count();
    if known {
        info!(peer = name, %peer, "Peer exited");
    } else {
        debug!(peer = name, %peer, "Exit from unknown peer");
    }
}

// =============================================================================
// PUB/SUB
// =============================================================================

/// Apply `[value, ts, tags]` messages to the hosted value with the same URI.
pub fn value_update_handler(values: Arc<ValueRegistry>) -> MessageHandler {
    Arc::new(move |topic: &str, payload| {
        let Some(core) = values.get(topic) else {
            return;
        };
        match core.update_from_wire(&payload) {
            Some(UpdateOutcome::Applied) => debug!(uri = topic, "Applied published value"),
            Some(_) => {}
            None => warn!(uri = topic, %payload, "Malformed value publication"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueCore;
    use serde_json::json;
    use shared_types::Timestamp;

    #[test]
    fn test_value_update_handler_routes_by_exact_uri() {
        let values = Arc::new(ValueRegistry::new());
        values.insert(Arc::new(ValueCore::new("house://temp", None)));
        let handler = value_update_handler(values.clone());

        handler("house://temp", json!([21, 5.0, {}]));
        handler("house://temperature", json!([99, 6.0, {}]));
        handler("house://temp", json!("garbage"));

        let core = values.get("house://temp").unwrap();
        assert_eq!(core.value(), json!(21));
        assert_eq!(core.timestamp(), Timestamp::from_secs_f64(5.0));
    }
}
