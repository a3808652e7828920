//! Event handlers: value announcements and metadata propagation.

use super::{EVENT_VALUE_ENTERING, EVENT_VALUE_METADATA_UPDATE};
use crate::registry::ValueRegistry;
use serde_json::Value;
use shared_bus::{Observable, ObserverId};
use shared_types::NodeIdentity;
use std::sync::Arc;
use tracing::{debug, warn};
use vm_03_event::EventHandler;

/// A peer created a value. Observers receive `(peer_name, uri)`.
#[derive(Debug, Default)]
pub struct ValueEnteringEvent {
    observers: Observable<(String, String)>,
}

impl ValueEnteringEvent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(String, String) + Send + Sync + 'static,
    {
        self.observers.subscribe(move |(peer_name, uri)| observer(peer_name, uri))
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    #[must_use]
    pub fn observers(&self) -> usize {
        self.observers.len()
    }
}

impl EventHandler for ValueEnteringEvent {
    fn name(&self) -> &str {
        EVENT_VALUE_ENTERING
    }

    fn process_event(&self, peer_name: &str, data: Value) {
        let Value::String(uri) = data else {
            warn!(peer = peer_name, %data, "Value entering event without a URI");
            return;
        };
        debug!(peer = peer_name, %uri, "Peer announced a value");
        self.observers.notify((peer_name.to_string(), uri));
    }
}

/// A peer changed the metadata of a value: `[uri, metadata, source]`.
#[derive(Debug)]
pub struct ValueMetadataUpdateEvent {
    values: Arc<ValueRegistry>,
}

impl ValueMetadataUpdateEvent {
    #[must_use]
    pub fn new(values: Arc<ValueRegistry>) -> Self {
        Self { values }
    }
}

impl EventHandler for ValueMetadataUpdateEvent {
    fn name(&self) -> &str {
        EVENT_VALUE_METADATA_UPDATE
    }

    fn process_event(&self, peer_name: &str, data: Value) {
        let (Some(uri), Some(Value::Object(metadata))) = (data.get(0).and_then(Value::as_str), data.get(1)) else {
            warn!(peer = peer_name, %data, "Malformed metadata update event");
            return;
        };
        let Some(core) = self.values.get(uri) else {
            return;
        };
        let source = data.get(2).and_then(NodeIdentity::from_payload);
        if core.apply_metadata(metadata.clone(), source) {
            debug!(peer = peer_name, uri, "Metadata updated by peer");
        }
    }
}
