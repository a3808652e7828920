//! # Local Mesh Adapter
//!
//! An in-process group-messaging hub. Every `LocalMeshNode` created from
//! the same `LocalMesh` sees the others as peers once both are started,
//! exactly like nodes on a LAN would after exchanging beacons.
//!
//! Each member is given a synthetic fabric address on the loopback
//! interface so that endpoint derivation behaves as on a real network.

use crate::domain::FabricError;
use crate::ports::{FabricEvent, FabricEvents, PeerFabric};
use parking_lot::Mutex;
use shared_types::PeerId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

const FIRST_SYNTHETIC_PORT: u16 = 49152;

#[derive(Debug)]
struct Member {
    name: String,
    headers: HashMap<String, String>,
    groups: HashSet<String>,
    address: String,
    sender: Option<mpsc::UnboundedSender<FabricEvent>>,
    stopped: bool,
}

impl Member {
    fn is_active(&self) -> bool {
        self.sender.is_some()
    }

    fn deliver(&self, event: FabricEvent) {
        if let Some(sender) = &self.sender {
            // A closed receiver means the member's event loop is gone.
            let _ = sender.send(event);
        }
    }
}

#[derive(Debug, Default)]
struct MeshState {
    members: HashMap<PeerId, Member>,
    next_port: u16,
}

impl MeshState {
    fn allocate_address(&mut self) -> String {
        let port = FIRST_SYNTHETIC_PORT.wrapping_add(self.next_port);
        self.next_port = self.next_port.wrapping_add(1);
        format!("tcp://127.0.0.1:{port}")
    }
}

/// Shared hub. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct LocalMesh {
    state: Arc<Mutex<MeshState>>,
}

impl LocalMesh {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a member node. It is invisible to others until started.
    #[must_use]
    pub fn node(&self, name: impl Into<String>) -> LocalMeshNode {
        let id = PeerId::random();
        let name = name.into();
        let mut state = self.state.lock();
        let address = state.allocate_address();
        state.members.insert(
            id,
            Member {
                name: name.clone(),
                headers: HashMap::new(),
                groups: HashSet::new(),
                address,
                sender: None,
                stopped: false,
            },
        );
        LocalMeshNode {
            id,
            name,
            mesh: self.clone(),
        }
    }

    /// Number of started members.
    #[must_use]
    pub fn active_members(&self) -> usize {
        self.state.lock().members.values().filter(|m| m.is_active()).count()
    }
}

/// One member of a `LocalMesh`.
#[derive(Debug)]
pub struct LocalMeshNode {
    id: PeerId,
    name: String,
    mesh: LocalMesh,
}

impl LocalMeshNode {
    fn with_self<R>(&self, f: impl FnOnce(&mut Member) -> R) -> Option<R> {
        self.mesh.state.lock().members.get_mut(&self.id).map(f)
    }

    fn ensure_sendable(member: &Member) -> Result<(), FabricError> {
        if member.stopped {
            Err(FabricError::Stopped)
        } else if !member.is_active() {
            Err(FabricError::NotStarted)
        } else {
            Ok(())
        }
    }
}

impl PeerFabric for LocalMeshNode {
    fn uuid(&self) -> PeerId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_header(&self, key: &str, value: &str) {
        self.with_self(|me| me.headers.insert(key.to_string(), value.to_string()));
    }

    fn join(&self, group: &str) {
        debug!(node = %self.name, group, "Joining group");
        self.with_self(|me| me.groups.insert(group.to_string()));
    }

    fn leave(&self, group: &str) {
        debug!(node = %self.name, group, "Leaving group");
        self.with_self(|me| me.groups.remove(group));
    }

    fn shout(&self, group: &str, payload: Vec<u8>) -> Result<(), FabricError> {
        let state = self.mesh.state.lock();
        let me = state.members.get(&self.id).ok_or(FabricError::Stopped)?;
        Self::ensure_sendable(me)?;

        let mut delivered = 0usize;
        for (id, member) in &state.members {
            if *id == self.id || !member.is_active() || !member.groups.contains(group) {
                continue;
            }
            member.deliver(FabricEvent::Shout {
                peer: self.id,
                name: self.name.clone(),
                group: group.to_string(),
                payload: payload.clone(),
            });
            delivered += 1;
        }
        trace!(node = %self.name, group, delivered, "Shout");
        Ok(())
    }

    fn whisper(&self, peer: PeerId, payload: Vec<u8>) -> Result<(), FabricError> {
        let state = self.mesh.state.lock();
        let me = state.members.get(&self.id).ok_or(FabricError::Stopped)?;
        Self::ensure_sendable(me)?;

        let target = state
            .members
            .get(&peer)
            .filter(|m| m.is_active())
            .ok_or(FabricError::UnknownPeer(peer))?;
        target.deliver(FabricEvent::Whisper {
            peer: self.id,
            name: self.name.clone(),
            payload,
        });
        Ok(())
    }

    fn peer_header(&self, peer: PeerId, key: &str) -> Option<String> {
        let state = self.mesh.state.lock();
        state
            .members
            .get(&peer)
            .filter(|m| m.is_active())
            .and_then(|m| m.headers.get(key).cloned())
    }

    fn peer_address(&self, peer: PeerId) -> Option<String> {
        let state = self.mesh.state.lock();
        state
            .members
            .get(&peer)
            .filter(|m| m.is_active())
            .map(|m| m.address.clone())
    }

    fn peers(&self) -> Vec<PeerId> {
        let state = self.mesh.state.lock();
        state
            .members
            .iter()
            .filter(|(id, m)| **id != self.id && m.is_active())
            .map(|(id, _)| *id)
            .collect()
    }

    fn start(&self) -> Result<FabricEvents, FabricError> {
        let mut state = self.mesh.state.lock();
        let (tx, rx) = mpsc::unbounded_channel();

        let me = state.members.get(&self.id).ok_or(FabricError::Stopped)?;
        if me.stopped {
            return Err(FabricError::Stopped);
        }
        if me.is_active() {
            return Err(FabricError::AlreadyStarted);
        }
        let my_enter = FabricEvent::Enter {
            peer: self.id,
            name: me.name.clone(),
            headers: me.headers.clone(),
            address: me.address.clone(),
        };

        for (id, member) in &state.members {
            if *id == self.id || !member.is_active() {
                continue;
            }
            member.deliver(my_enter.clone());
            let _ = tx.send(FabricEvent::Enter {
                peer: *id,
                name: member.name.clone(),
                headers: member.headers.clone(),
                address: member.address.clone(),
            });
        }

        if let Some(me) = state.members.get_mut(&self.id) {
            me.sender = Some(tx);
        }
        debug!(node = %self.name, id = %self.id, "Entered local mesh");
        Ok(rx)
    }

    fn stop(&self) {
        let mut state = self.mesh.state.lock();
        let was_active = match state.members.get_mut(&self.id) {
            Some(me) => {
                me.stopped = true;
                me.groups.clear();
                me.sender.take().is_some()
            }
            None => false,
        };
        if !was_active {
            return;
        }

        for (id, member) in &state.members {
            if *id != self.id {
                member.deliver(FabricEvent::Exit {
                    peer: self.id,
                    name: self.name.clone(),
                });
            }
        }
        debug!(node = %self.name, id = %self.id, "Left local mesh");
    }
}

impl Drop for LocalMeshNode {
    fn drop(&mut self) {
        self.stop();
        self.mesh.state.lock().members.remove(&self.id);
    }
}
