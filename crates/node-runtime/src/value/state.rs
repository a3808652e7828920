//! # Value State
//!
//! The synchronized state behind one URI, shared between the owning
//! `SharedValue`, the registry and the handlers that answer peers.
//!
//! ## Update rules
//!
//! - A peer update is applied only when its timestamp is strictly newer.
//!   Older updates are logged and dropped; equal ones are ignored.
//! - A local set never moves the timestamp backwards. `set_now` stamps at
//!   least one microsecond past the stored timestamp so the write always
//!   wins on peers; an explicit older timestamp is refused.
//! - Only peer updates notify observers.

use super::history::HistoryProvider;
use parking_lot::RwLock;
use serde_json::{json, Value};
use shared_bus::{Observable, ObserverId};
use shared_types::{Metadata, NodeIdentity, Payload, Tags, Timestamp};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a value observer receives.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub uri: String,
    pub value: Payload,
    pub timestamp: Timestamp,
    pub tags: Tags,
}

/// What a metadata observer receives.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataChange {
    pub uri: String,
    pub metadata: Metadata,
    pub source: Option<NodeIdentity>,
}

/// Point-in-time copy of a value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSnapshot {
    pub value: Payload,
    pub timestamp: Timestamp,
    pub tags: Tags,
}

impl ValueSnapshot {
    /// `[value, ts_float, tags]`, the pub/sub and last-value payload.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!([self.value, self.timestamp.as_secs_f64(), self.tags])
    }

    /// Parse `[value, ts_float, tags]`. Missing or null tags read as empty.
    #[must_use]
    pub fn from_wire(payload: &Value) -> Option<Self> {
        let items = payload.as_array()?;
        let value = items.first()?.clone();
        let timestamp = Timestamp::from_secs_f64(items.get(1)?.as_f64()?);
        let tags = match items.get(2) {
            None | Some(Value::Null) => Tags::new(),
            Some(Value::Object(tags)) => tags.clone(),
            Some(_) => return None,
        };
        Some(Self { value, timestamp, tags })
    }
}

/// Result of applying an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// Older than the stored timestamp.
    Stale,
    /// Same timestamp as the stored one.
    Unchanged,
}

#[derive(Debug, Default)]
struct ValueState {
    value: Payload,
    timestamp: Timestamp,
    tags: Tags,
    static_tags: Tags,
    metadata: Option<Metadata>,
    metadata_source: Option<NodeIdentity>,
}

pub struct ValueCore {
    uri: String,
    state: RwLock<ValueState>,
    observers: Observable<ValueChange>,
    metadata_observers: Observable<MetadataChange>,
    history: Option<Arc<dyn HistoryProvider>>,
}

impl ValueCore {
    /// A never-set value: null at the epoch.
    #[must_use]
    pub fn new(uri: impl Into<String>, history: Option<Arc<dyn HistoryProvider>>) -> Self {
        Self {
            uri: uri.into(),
            state: RwLock::new(ValueState::default()),
            observers: Observable::new(),
            metadata_observers: Observable::new(),
            history,
        }
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn snapshot(&self) -> ValueSnapshot {
        let state = self.state.read();
        ValueSnapshot {
            value: state.value.clone(),
            timestamp: state.timestamp,
            tags: state.tags.clone(),
        }
    }

    #[must_use]
    pub fn value(&self) -> Payload {
        self.state.read().value.clone()
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.state.read().timestamp
    }

    #[must_use]
    pub fn tags(&self) -> Tags {
        self.state.read().tags.clone()
    }

    #[must_use]
    pub fn static_tags(&self) -> Tags {
        self.state.read().static_tags.clone()
    }

    #[must_use]
    pub fn metadata(&self) -> Option<Metadata> {
        self.state.read().metadata.clone()
    }

    #[must_use]
    pub fn metadata_source(&self) -> Option<NodeIdentity> {
        self.state.read().metadata_source.clone()
    }

    #[must_use]
    pub fn history(&self) -> Option<Arc<dyn HistoryProvider>> {
        self.history.clone()
    }

    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.history.is_some()
    }

    pub fn set_static_tags(&self, tags: Tags) {
        self.state.write().static_tags = tags;
    }

    /// Replace the dynamic tags without publishing.
    pub fn set_tags(&self, tags: Tags) {
        self.state.write().tags = tags;
    }

    // =========================================================================
    // LOCAL WRITES
    // =========================================================================

    /// Stamp a local write with the current time, or one microsecond past
    /// the stored timestamp if the clock is behind it.
    pub fn set_now(&self, value: Payload, tags: Option<Tags>, identity: &NodeIdentity) -> ValueSnapshot {
        let mut state = self.state.write();
        let floor = Timestamp::from_micros(state.timestamp.as_micros().saturating_add(1));
        let timestamp = Timestamp::now().max(floor);
        Self::write_local(&mut state, value, timestamp, tags, identity)
    }

    /// Apply a local write with an explicit timestamp.
    ///
    /// Returns `None` when `timestamp` is older than the stored one.
    pub fn set_at(
        &self,
        value: Payload,
        timestamp: Timestamp,
        tags: Option<Tags>,
        identity: &NodeIdentity,
    ) -> Option<ValueSnapshot> {
        let mut state = self.state.write();
        if timestamp < state.timestamp {
            warn!(
                uri = %self.uri,
                incoming = %timestamp,
                current = %state.timestamp,
                "Refusing local write older than current value"
            );
            return None;
        }
        Some(Self::write_local(&mut state, value, timestamp, tags, identity))
    }

    fn write_local(
        state: &mut ValueState,
        value: Payload,
        timestamp: Timestamp,
        tags: Option<Tags>,
        identity: &NodeIdentity,
    ) -> ValueSnapshot {
        if let Some(tags) = tags {
            state.tags = tags;
        }
        state.tags.extend(identity.to_tags());
        state.value = value;
        state.timestamp = timestamp;
        ValueSnapshot {
            value: state.value.clone(),
            timestamp,
            tags: state.tags.clone(),
        }
    }

    // =========================================================================
    // PEER WRITES
    // =========================================================================

    /// Apply a value received from a peer and notify observers if it was newer.
    pub fn update_from_peer(&self, value: Payload, timestamp: Timestamp, tags: Tags) -> UpdateOutcome {
        let change = {
            let mut state = self.state.write();
            if timestamp < state.timestamp {
                warn!(
                    uri = %self.uri,
                    incoming = %timestamp,
                    current = %state.timestamp,
                    "Ignoring peer update older than current value"
                );
                return UpdateOutcome::Stale;
            }
            if timestamp == state.timestamp {
                return UpdateOutcome::Unchanged;
            }
            state.value = value;
            state.timestamp = timestamp;
            state.tags = tags;
            ValueChange {
                uri: self.uri.clone(),
                value: state.value.clone(),
                timestamp,
                tags: state.tags.clone(),
            }
        };
        debug!(uri = %self.uri, timestamp = %change.timestamp, "Value updated by peer");
        self.observers.notify(change);
        UpdateOutcome::Applied
    }

    /// Parse and apply a `[value, ts_float, tags]` payload. `None` if malformed.
    pub fn update_from_wire(&self, payload: &Value) -> Option<UpdateOutcome> {
        let snapshot = ValueSnapshot::from_wire(payload)?;
        Some(self.update_from_peer(snapshot.value, snapshot.timestamp, snapshot.tags))
    }

    // =========================================================================
    // METADATA
    // =========================================================================

    /// Store metadata written by this node. Observers are not notified.
    pub fn set_metadata_local(&self, metadata: Metadata, identity: &NodeIdentity) {
        let mut state = self.state.write();
        state.metadata = Some(metadata);
        state.metadata_source = Some(identity.clone());
    }

    /// Store metadata learned from a peer and notify metadata observers.
    /// Empty metadata is ignored.
    pub fn apply_metadata(&self, metadata: Metadata, source: Option<NodeIdentity>) -> bool {
        if metadata.is_empty() {
            return false;
        }
        {
            let mut state = self.state.write();
            state.metadata = Some(metadata.clone());
            state.metadata_source = source.clone();
        }
        self.metadata_observers.notify(MetadataChange {
            uri: self.uri.clone(),
            metadata,
            source,
        });
        true
    }

    // =========================================================================
    // OBSERVERS
    // =========================================================================

    pub fn observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(ValueChange) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer)
    }

    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn observe_metadata<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(MetadataChange) + Send + Sync + 'static,
    {
        self.metadata_observers.subscribe(observer)
    }

    pub fn unobserve_metadata(&self, id: ObserverId) -> bool {
        self.metadata_observers.unsubscribe(id)
    }
}

impl fmt::Debug for ValueCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCore")
            .field("uri", &self.uri)
            .field("state", &*self.state.read())
            .field("observers", &self.observers.len())
            .field("archived", &self.is_archived())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::PeerId;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn me() -> NodeIdentity {
        NodeIdentity::new("me", PeerId::random())
    }

    #[tokio::test]
    async fn test_peer_update_only_applies_newer() {
        let core = ValueCore::new("a://x", None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        core.observe(move |change| {
            let _ = tx.send(change);
        });

        let t1 = Timestamp::from_secs_f64(100.0);
        let t0 = Timestamp::from_secs_f64(50.0);
        assert_eq!(core.update_from_peer(json!(1), t1, Tags::new()), UpdateOutcome::Applied);
        assert_eq!(core.update_from_peer(json!(2), t1, Tags::new()), UpdateOutcome::Unchanged);
        assert_eq!(core.update_from_peer(json!(3), t0, Tags::new()), UpdateOutcome::Stale);
        assert_eq!(core.value(), json!(1));
        assert_eq!(core.timestamp(), t1);

        let change = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(change.uri, "a://x");
        assert_eq!(change.value, json!(1));
        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_local_write_stamps_identity_without_notifying() {
        let core = ValueCore::new("a://x", None);
        core.observe(|_| panic!("local writes must not notify"));
        let identity = me();

        let mut tags = Tags::new();
        tags.insert("unit".into(), json!("C"));
        let snapshot = core.set_now(json!(20), Some(tags), &identity);

        assert_eq!(snapshot.tags.get("unit"), Some(&json!("C")));
        assert_eq!(snapshot.tags.get("peer_name"), Some(&json!("me")));
        assert_eq!(snapshot.tags.get("peer_uuid"), Some(&json!(identity.peer_uuid)));
        assert!(!snapshot.timestamp.is_epoch());
        assert_eq!(core.snapshot(), snapshot);
    }

    #[test]
    fn test_local_write_never_goes_backwards() {
        let core = ValueCore::new("a://x", None);
        let identity = me();
        let future = Timestamp::now().offset_secs(3600);
        core.update_from_peer(json!("peer"), future, Tags::new());

        let snapshot = core.set_now(json!("mine"), None, &identity);
        assert!(snapshot.timestamp > future);

        assert!(core
            .set_at(json!("old"), Timestamp::from_secs_f64(1.0), None, &identity)
            .is_none());
        assert_eq!(core.value(), json!("mine"));
    }

    #[test]
    fn test_update_from_wire() {
        let core = ValueCore::new("a://x", None);
        assert_eq!(
            core.update_from_wire(&json!([5, 10.5, {"k": "v"}])),
            Some(UpdateOutcome::Applied)
        );
        assert_eq!(core.tags().get("k"), Some(&json!("v")));
        assert_eq!(core.update_from_wire(&json!([6, 11.0])), Some(UpdateOutcome::Applied));
        assert!(core.tags().is_empty());
        assert_eq!(core.update_from_wire(&json!({"not": "a list"})), None);
        assert_eq!(core.update_from_wire(&json!([7, "soon"])), None);
    }

    #[tokio::test]
    async fn test_metadata_ignores_empty_and_notifies() {
        let core = ValueCore::new("a://x", None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        core.observe_metadata(move |change| {
            let _ = tx.send(change);
        });

        assert!(!core.apply_metadata(Metadata::new(), None));
        assert!(core.metadata().is_none());

        let mut metadata = Metadata::new();
        metadata.insert("room".into(), json!("kitchen"));
        let source = me();
        assert!(core.apply_metadata(metadata.clone(), Some(source.clone())));

        let change = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(change.metadata, metadata);
        assert_eq!(change.source, Some(source.clone()));
        assert_eq!(core.metadata_source(), Some(source));
    }
}
