//! # SharedValue
//!
//! ## Creation protocol
//!
//! ```text
//! 1. Serve the value over RPC under its URI (and its history, if archived)
//! 2. No static tags given?  → survey peers for them
//! 3. Resolve the initial value:
//!      none            → survey the freshest value and apply it as a peer update
//!      (value, ts)     → publish it, unless a surveyed value is at least as new
//!      value           → stamp now and publish
//! 4. Metadata given?        → broadcast a metadata update
//! 5. Host the URI: answer surveys, subscribe to publications, join EVENT
//! 6. Announce the value to peers
//! ```
//!
//! Dropping the handle stops hosting the URI.

use super::history::{history_procedure, parse_period, HistoryPoint, HistoryProvider};
use super::state::{MetadataChange, ValueChange, ValueCore, ValueSnapshot};
use crate::container::Node;
use crate::errors::ValueError;
use serde_json::{json, Map, Value};
use shared_bus::ObserverId;
use shared_types::{Metadata, NodeIdentity, Payload, Tags, Timestamp};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use vm_02_survey::SurveyOptions;
use vm_04_rpc::{procedure, ProcedureError};

#[derive(Debug, Clone, Default)]
enum InitialValue {
    #[default]
    Unset,
    Now(Payload),
    At(Payload, Timestamp),
}

/// Options for creating a `SharedValue`.
#[must_use]
pub struct SharedValueBuilder {
    node: Node,
    uri: String,
    initial: InitialValue,
    static_tags: Tags,
    tags: Option<Tags>,
    metadata: Option<Metadata>,
    survey_last_value: bool,
    survey_static_tags: bool,
    history: Option<Arc<dyn HistoryProvider>>,
}

impl SharedValueBuilder {
    fn new(node: &Node, uri: impl Into<String>) -> Self {
        Self {
            node: node.clone(),
            uri: uri.into(),
            initial: InitialValue::Unset,
            static_tags: Tags::new(),
            tags: None,
            metadata: None,
            survey_last_value: true,
            survey_static_tags: true,
            history: None,
        }
    }

    /// Start from `value`, stamped with the current time.
    pub fn value(mut self, value: impl Into<Payload>) -> Self {
        self.initial = InitialValue::Now(value.into());
        self
    }

    /// Start from `value` at `timestamp`. A surveyed value at least as new wins.
    pub fn value_ts(mut self, value: impl Into<Payload>, timestamp: Timestamp) -> Self {
        self.initial = InitialValue::At(value.into(), timestamp);
        self
    }

    pub fn static_tags(mut self, tags: Tags) -> Self {
        self.static_tags = tags;
        self
    }

    /// Dynamic tags sent with the initial value.
    pub fn tags(mut self, tags: Tags) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether to ask peers for the current value (default: yes).
    pub fn survey_last_value(mut self, enabled: bool) -> Self {
        self.survey_last_value = enabled;
        self
    }

    /// Whether to ask peers for static tags when none are given (default: yes).
    pub fn survey_static_tags(mut self, enabled: bool) -> Self {
        self.survey_static_tags = enabled;
        self
    }

    /// Serve history for this value from `provider`.
    pub fn archived(mut self, provider: Arc<dyn HistoryProvider>) -> Self {
        self.history = Some(provider);
        self
    }

    /// Run the creation protocol.
    pub async fn create(self) -> Result<SharedValue, ValueError> {
        let Self {
            node,
            uri,
            initial,
            static_tags,
            tags,
            metadata,
            survey_last_value,
            survey_static_tags,
            history,
        } = self;

        let core = Arc::new(ValueCore::new(uri.clone(), history));
        let mut value = SharedValue {
            core,
            node,
            hosted: false,
        };

        if static_tags.is_empty() && survey_static_tags {
            let surveyed = value
                .node
                .survey_value_static_tags(&uri, SurveyOptions::default())
                .await?;
            value.core.set_static_tags(surveyed);
        } else {
            value.core.set_static_tags(static_tags);
        }

        value.resolve_initial(initial, tags, survey_last_value).await?;

        if let Some(metadata) = metadata.filter(|metadata| !metadata.is_empty()) {
            let identity = value.node.name_uuid();
            value.core.set_metadata_local(metadata.clone(), &identity);
            value.node.event_value_metadata_update(&uri, &metadata, &identity)?;
        }

        register_procedures(&value.node, &value.core)?;
        value.host();
        value.node.event_value_entering(&uri)?;
        info!(%uri, node = %value.node.name(), "Shared value created");
        Ok(value)
    }
}

fn register_procedures(node: &Node, core: &Arc<ValueCore>) -> Result<(), ValueError> {
    let procedures = &node.inner().procedures;

    let weak: Weak<ValueCore> = Arc::downgrade(core);
    let uri = core.uri().to_string();
    procedures.register(
        &uri.clone(),
        procedure(move |_, _| {
            let core = weak.upgrade();
            let uri = uri.clone();
            async move {
                let core = core.ok_or_else(|| ProcedureError::new("KeyError", format!("{uri} is no longer hosted")))?;
                let snapshot = core.snapshot();
                Ok::<_, ProcedureError>(json!([snapshot.value, snapshot.timestamp.as_secs_f64()]))
            }
        }),
    )?;

    if let Some(provider) = core.history() {
        let uri = core.uri().to_string();
        procedures.register(
            &history_procedure(&uri),
            procedure(move |args, _| {
                let provider = provider.clone();
                let uri = uri.clone();
                async move {
                    let (start, end) = parse_period(&args)?;
                    let points = provider.history(&uri, start, end).await?;
                    Ok::<_, ProcedureError>(Value::Array(points.iter().map(HistoryPoint::to_wire).collect()))
                }
            }),
        )?;
    } else {
        procedures.unregister(&history_procedure(core.uri()));
    }
    Ok(())
}

/// Handle to a value hosted on a node.
pub struct SharedValue {
    core: Arc<ValueCore>,
    node: Node,
    hosted: bool,
}

impl SharedValue {
    #[must_use = "the builder does nothing until `create` is awaited"]
    pub fn builder(node: &Node, uri: impl Into<String>) -> SharedValueBuilder {
        SharedValueBuilder::new(node, uri)
    }

    /// Create with default options: no initial value, survey peers.
    pub async fn new(node: &Node, uri: impl Into<String>) -> Result<Self, ValueError> {
        Self::builder(node, uri).create().await
    }

    async fn resolve_initial(
        &self,
        initial: InitialValue,
        tags: Option<Tags>,
        survey_last_value: bool,
    ) -> Result<(), ValueError> {
        let identity = self.node.name_uuid();
        match initial {
            InitialValue::Unset => {
                if let Some(tags) = tags {
                    self.core.set_tags(tags);
                }
                if survey_last_value {
                    let last = self.survey_freshest().await?;
                    self.core.update_from_peer(last.value, last.timestamp, last.tags);
                }
            }
            InitialValue::Now(value) => {
                let snapshot = self.core.set_now(value, tags, &identity);
                self.node.publish(self.uri(), &snapshot)?;
            }
            InitialValue::At(value, timestamp) => {
                let surveyed = if survey_last_value {
                    Some(self.survey_freshest().await?)
                } else {
                    None
                };
                match surveyed {
                    Some(last) if last.timestamp >= timestamp => {
                        debug!(uri = %self.uri(), "Peers hold a value at least as new, adopting it");
                        self.core.update_from_peer(last.value, last.timestamp, last.tags);
                    }
                    _ => {
                        self.publish_at(value, timestamp, tags, &identity)?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn survey_freshest(&self) -> Result<ValueSnapshot, ValueError> {
        Ok(self
            .node
            .survey_last_value(self.uri(), SurveyOptions::default().with_limit(1))
            .await?)
    }

    fn host(&mut self) {
        let inner = self.node.inner();
        if let Some(previous) = inner.values.insert(self.core.clone()) {
            warn!(uri = %previous.uri(), "Replacing an already hosted value with the same URI");
        }
        inner.subscriber.subscribe(self.uri());
        inner.events.acquire_group();
        self.hosted = true;
    }

    fn publish_at(
        &self,
        value: Payload,
        timestamp: Timestamp,
        tags: Option<Tags>,
        identity: &NodeIdentity,
    ) -> Result<bool, ValueError> {
        match self.core.set_at(value, timestamp, tags, identity) {
            Some(snapshot) => {
                self.node.publish(self.uri(), &snapshot)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn uri(&self) -> &str {
        self.core.uri()
    }

    #[must_use]
    pub fn node(&self) -> &Node {
        &self.node
    }

    #[must_use]
    pub fn value(&self) -> Payload {
        self.core.value()
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.core.timestamp()
    }

    /// Wire form of the timestamp: float seconds since the epoch.
    #[must_use]
    pub fn timestamp_f64(&self) -> f64 {
        self.core.timestamp().as_secs_f64()
    }

    #[must_use]
    pub fn value_ts(&self) -> (Payload, Timestamp) {
        let snapshot = self.core.snapshot();
        (snapshot.value, snapshot.timestamp)
    }

    #[must_use]
    pub fn value_tags(&self) -> (Payload, Tags) {
        let snapshot = self.core.snapshot();
        (snapshot.value, snapshot.tags)
    }

    #[must_use]
    pub fn ts_tags(&self) -> (Timestamp, Tags) {
        let snapshot = self.core.snapshot();
        (snapshot.timestamp, snapshot.tags)
    }

    #[must_use]
    pub fn value_ts_tags(&self) -> ValueSnapshot {
        self.core.snapshot()
    }

    #[must_use]
    pub fn tags(&self) -> Tags {
        self.core.tags()
    }

    #[must_use]
    pub fn static_tags(&self) -> Tags {
        self.core.static_tags()
    }

    #[must_use]
    pub fn metadata(&self) -> Option<Metadata> {
        self.core.metadata()
    }

    /// Who last set the metadata.
    #[must_use]
    pub fn metadata_source(&self) -> Option<NodeIdentity> {
        self.core.metadata_source()
    }

    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.core.is_archived()
    }

    // =========================================================================
    // SETTERS
    // =========================================================================

    /// Set the value now and publish it.
    pub fn set_value(&self, value: impl Into<Payload>) -> Result<(), ValueError> {
        let snapshot = self.core.set_now(value.into(), None, &self.node.name_uuid());
        self.node.publish(self.uri(), &snapshot)?;
        Ok(())
    }

    /// Set the value at `timestamp` and publish it. Returns `false`
    /// without publishing when `timestamp` is older than the current one.
    pub fn set_value_ts(&self, value: impl Into<Payload>, timestamp: Timestamp) -> Result<bool, ValueError> {
        self.publish_at(value.into(), timestamp, None, &self.node.name_uuid())
    }

    /// Replace the dynamic tags, set the value now and publish.
    pub fn set_value_tags(&self, value: impl Into<Payload>, tags: Tags) -> Result<(), ValueError> {
        let snapshot = self.core.set_now(value.into(), Some(tags), &self.node.name_uuid());
        self.node.publish(self.uri(), &snapshot)?;
        Ok(())
    }

    pub fn set_value_ts_tags(
        &self,
        value: impl Into<Payload>,
        timestamp: Timestamp,
        tags: Tags,
    ) -> Result<bool, ValueError> {
        self.publish_at(value.into(), timestamp, Some(tags), &self.node.name_uuid())
    }

    /// Replace the dynamic tags. Nothing is published.
    pub fn set_tags(&self, tags: Tags) {
        self.core.set_tags(tags);
    }

    pub fn set_static_tags(&self, tags: Tags) {
        self.core.set_static_tags(tags);
    }

    /// Store metadata and broadcast it to peers hosting the same URI.
    pub fn set_metadata(&self, metadata: Metadata) -> Result<(), ValueError> {
        let identity = self.node.name_uuid();
        self.core.set_metadata_local(metadata.clone(), &identity);
        self.node.event_value_metadata_update(self.uri(), &metadata, &identity)?;
        Ok(())
    }

    /// Fetch metadata from peers. Returns `true` if some was found.
    pub async fn survey_metadata(&self) -> Result<bool, ValueError> {
        let (metadata, source) = self
            .node
            .survey_value_metadata(self.uri(), SurveyOptions::default())
            .await?;
        Ok(metadata.is_some_and(|metadata| self.core.apply_metadata(metadata, source)))
    }

    // =========================================================================
    // OBSERVERS
    // =========================================================================

    /// Observe updates received from peers.
    pub fn observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(ValueChange) + Send + Sync + 'static,
    {
        self.core.observe(observer)
    }

    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.core.unobserve(id)
    }

    pub fn observe_metadata<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(MetadataChange) + Send + Sync + 'static,
    {
        self.core.observe_metadata(observer)
    }

    pub fn unobserve_metadata(&self, id: ObserverId) -> bool {
        self.core.unobserve_metadata(id)
    }

    // =========================================================================
    // HISTORY
    // =========================================================================

    /// Archived samples between `start` and `end`, from whichever peer archives this URI.
    pub async fn get_history(&self, start: Timestamp, end: Timestamp) -> Result<Vec<HistoryPoint>, ValueError> {
        let peer = self
            .node
            .survey_value_history(self.uri(), (start, end), SurveyOptions::default())
            .await?
            .ok_or_else(|| ValueError::NoPeerWithHistory {
                uri: self.uri().to_string(),
            })?;

        let reply = self
            .node
            .call_on(
                &peer,
                &history_procedure(self.uri()),
                vec![json!([start.as_secs_f64(), end.as_secs_f64()])],
                Map::new(),
            )
            .await?;
        let Value::Array(points) = reply else {
            return Err(ValueError::MalformedHistory {
                peer,
                reason: format!("expected a list, got {reply}"),
            });
        };
        points
            .iter()
            .map(|point| HistoryPoint::from_wire(point).map_err(|reason| ValueError::MalformedHistory {
                peer: peer.clone(),
                reason,
            }))
            .collect()
    }
}

impl Drop for SharedValue {
    fn drop(&mut self) {
        let uri = self.core.uri();
        if !self.hosted {
            debug!(%uri, "Shared value dropped before it was hosted");
            return;
        }
        let inner = self.node.inner();
        let owned = inner.values.remove_if(uri, &self.core);
        if owned || !inner.values.contains(uri) {
            inner.procedures.unregister(uri);
            inner.procedures.unregister(&history_procedure(uri));
            inner.subscriber.unsubscribe(uri);
        }
        inner.events.release_group();
        debug!(%uri, "Shared value dropped");
    }
}

impl std::fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedValue")
            .field("uri", &self.uri())
            .field("node", &self.node.name())
            .field("core", &self.core)
            .finish()
    }
}
