//! # Outbound Port: Peer Messaging Fabric
//!
//! Implementations own peer liveness (beacons, heartbeats, expiry). The
//! runtime only reacts to the `FabricEvent` stream returned by `start`.

use crate::domain::FabricError;
use shared_types::PeerId;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Something that happened on the fabric, as seen by the local node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FabricEvent {
    /// A peer appeared. `address` is the fabric address it was seen on.
    Enter {
        peer: PeerId,
        name: String,
        headers: HashMap<String, String>,
        address: String,
    },
    /// A peer left or expired.
    Exit { peer: PeerId, name: String },
    /// A group broadcast from a peer.
    Shout {
        peer: PeerId,
        name: String,
        group: String,
        payload: Vec<u8>,
    },
    /// A unicast message from a peer.
    Whisper {
        peer: PeerId,
        name: String,
        payload: Vec<u8>,
    },
}

/// Receiving side of the fabric event stream.
pub type FabricEvents = mpsc::UnboundedReceiver<FabricEvent>;

/// Group-messaging transport consumed by the node runtime.
///
/// All methods are non-blocking; delivery is best-effort.
pub trait PeerFabric: Send + Sync {
    /// Unique id of the local node.
    fn uuid(&self) -> PeerId;

    /// Display name of the local node.
    fn name(&self) -> String;

    /// Advertise a header to peers. Must be called before `start`.
    fn set_header(&self, key: &str, value: &str);

    /// Join a broadcast group.
    fn join(&self, group: &str);

    /// Leave a broadcast group.
    fn leave(&self, group: &str);

    /// Broadcast to every peer that joined `group`.
    fn shout(&self, group: &str, payload: Vec<u8>) -> Result<(), FabricError>;

    /// Unicast to one peer.
    fn whisper(&self, peer: PeerId, payload: Vec<u8>) -> Result<(), FabricError>;

    /// A header advertised by a present peer.
    fn peer_header(&self, peer: PeerId, key: &str) -> Option<String>;

    /// Fabric address (`<proto>://<ip>:<port>`) of a present peer.
    fn peer_address(&self, peer: PeerId) -> Option<String>;

    /// Ids of all present peers.
    fn peers(&self) -> Vec<PeerId>;

    /// Enter the fabric and return the event stream.
    fn start(&self) -> Result<FabricEvents, FabricError>;

    /// Leave the fabric. Peers observe an `Exit`. Idempotent.
    fn stop(&self);
}
