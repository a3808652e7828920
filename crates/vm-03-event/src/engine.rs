use crate::errors::EventError;
use crate::handler::EventHandler;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use shared_types::{EventNotification, PeerId, WireFrame, EVENT_GROUP};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vm_01_peer_fabric::PeerFabric;

/// Name → handler table.
#[derive(Default, Clone)]
pub struct EventRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventRegistry {
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Broadcast/dispatch engine for `EVENT` traffic.
pub struct EventEngine {
    fabric: Arc<dyn PeerFabric>,
    registry: RwLock<EventRegistry>,
    members: Mutex<usize>,
}

impl EventEngine {
    #[must_use]
    pub fn new(fabric: Arc<dyn PeerFabric>) -> Self {
        Self {
            fabric,
            registry: RwLock::new(EventRegistry::default()),
            members: Mutex::new(0),
        }
    }

    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        debug!(event = handler.name(), "Registering event handler");
        self.registry.write().register(handler);
    }

    /// Broadcast `{event_name, data}` to the `EVENT` group.
    pub fn send(&self, event_name: &str, data: Value) -> Result<(), EventError> {
        let notification = EventNotification {
            event_name: event_name.to_string(),
            data,
        };
        self.fabric.shout(EVENT_GROUP, notification.encode()?)?;
        debug!(event = event_name, "Event sent");
        Ok(())
    }

    /// Route an incoming event to its handler.
    pub fn on_event(&self, peer: PeerId, peer_name: &str, payload: &[u8]) {
        let notification = match EventNotification::decode(payload) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(peer = peer_name, %peer, error = %e, "Dropping malformed event");
                return;
            }
        };
        let Some(handler) = self.registry.read().get(&notification.event_name) else {
            warn!(peer = peer_name, event = %notification.event_name, "No handler for event");
            return;
        };

        let event_name = notification.event_name;
        let data = notification.data;
        if catch_unwind(AssertUnwindSafe(|| handler.process_event(peer_name, data))).is_err() {
            error!(peer = peer_name, event = %event_name, "Event handler panicked");
        }
    }

    /// Take one reference on `EVENT` group membership. The first
    /// reference joins the group. Returns the new count.
    pub fn acquire_group(&self) -> usize {
        let mut members = self.members.lock();
        if *members == 0 {
            info!(node = %self.fabric.name(), "Joining EVENT group");
            self.fabric.join(EVENT_GROUP);
        }
        *members += 1;
        *members
    }

    /// Drop one reference. The last reference leaves the group.
    pub fn release_group(&self) -> usize {
        let mut members = self.members.lock();
        match *members {
            0 => warn!("EVENT group released more often than acquired"),
            1 => {
                info!(node = %self.fabric.name(), "Leaving EVENT group");
                self.fabric.leave(EVENT_GROUP);
                *members = 0;
            }
            _ => *members -= 1,
        }
        *members
    }

    /// Current number of membership references.
    #[must_use]
    pub fn group_references(&self) -> usize {
        *self.members.lock()
    }
}

impl std::fmt::Debug for EventEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEngine")
            .field("node", &self.fabric.name())
            .field("handlers", &self.registry.read().len())
            .field("group_references", &self.group_references())
            .finish()
    }
}
