//! Test utilities for crates that sit on top of the fabric.
//!
//! `RecordingFabric` captures everything the code under test sends and
//! lets the test inject fabric events by hand.

use crate::domain::FabricError;
use crate::ports::{FabricEvent, FabricEvents, PeerFabric};
use parking_lot::Mutex;
use shared_types::PeerId;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Recorded {
    headers: HashMap<String, String>,
    groups: BTreeSet<String>,
    joins: usize,
    leaves: usize,
    shouts: Vec<(String, Vec<u8>)>,
    whispers: Vec<(PeerId, Vec<u8>)>,
    peers: HashMap<PeerId, (HashMap<String, String>, String)>,
    sender: Option<mpsc::UnboundedSender<FabricEvent>>,
    stopped: bool,
}

/// A `PeerFabric` that records outbound traffic.
#[derive(Debug)]
pub struct RecordingFabric {
    id: PeerId,
    name: String,
    recorded: Mutex<Recorded>,
}

impl RecordingFabric {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PeerId::random(),
            name: name.into(),
            recorded: Mutex::new(Recorded::default()),
        }
    }

    /// Make a peer known for `peer_header`/`peer_address` lookups.
    pub fn add_peer(&self, peer: PeerId, headers: HashMap<String, String>, address: impl Into<String>) {
        self.recorded.lock().peers.insert(peer, (headers, address.into()));
    }

    /// Push an event into the stream returned by `start`.
    pub fn inject(&self, event: FabricEvent) -> bool {
        self.recorded
            .lock()
            .sender
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Drain recorded shouts.
    pub fn take_shouts(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut self.recorded.lock().shouts)
    }

    /// Drain recorded whispers.
    pub fn take_whispers(&self) -> Vec<(PeerId, Vec<u8>)> {
        std::mem::take(&mut self.recorded.lock().whispers)
    }

    /// Groups currently joined.
    #[must_use]
    pub fn groups(&self) -> BTreeSet<String> {
        self.recorded.lock().groups.clone()
    }

    /// Total `join` and `leave` calls seen.
    #[must_use]
    pub fn join_leave_counts(&self) -> (usize, usize) {
        let recorded = self.recorded.lock();
        (recorded.joins, recorded.leaves)
    }

    /// Header set by the code under test.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<String> {
        self.recorded.lock().headers.get(key).cloned()
    }
}

impl PeerFabric for RecordingFabric {
    fn uuid(&self) -> PeerId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_header(&self, key: &str, value: &str) {
        self.recorded.lock().headers.insert(key.into(), value.into());
    }

    fn join(&self, group: &str) {
        let mut recorded = self.recorded.lock();
        recorded.joins += 1;
        recorded.groups.insert(group.into());
    }

    fn leave(&self, group: &str) {
        let mut recorded = self.recorded.lock();
        recorded.leaves += 1;
        recorded.groups.remove(group);
    }

    fn shout(&self, group: &str, payload: Vec<u8>) -> Result<(), FabricError> {
        let mut recorded = self.recorded.lock();
        if recorded.stopped {
            return Err(FabricError::Stopped);
        }
        recorded.shouts.push((group.into(), payload));
        Ok(())
    }

    fn whisper(&self, peer: PeerId, payload: Vec<u8>) -> Result<(), FabricError> {
        let mut recorded = self.recorded.lock();
        if recorded.stopped {
            return Err(FabricError::Stopped);
        }
        recorded.whispers.push((peer, payload));
        Ok(())
    }

    fn peer_header(&self, peer: PeerId, key: &str) -> Option<String> {
        let recorded = self.recorded.lock();
        recorded.peers.get(&peer).and_then(|(h, _)| h.get(key).cloned())
    }

    fn peer_address(&self, peer: PeerId) -> Option<String> {
        let recorded = self.recorded.lock();
        recorded.peers.get(&peer).map(|(_, a)| a.clone())
    }

    fn peers(&self) -> Vec<PeerId> {
        self.recorded.lock().peers.keys().copied().collect()
    }

    fn start(&self) -> Result<FabricEvents, FabricError> {
        let mut recorded = self.recorded.lock();
        if recorded.sender.is_some() {
            return Err(FabricError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        recorded.sender = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        let mut recorded = self.recorded.lock();
        recorded.stopped = true;
        recorded.sender = None;
    }
}
