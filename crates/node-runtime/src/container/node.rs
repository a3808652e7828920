//! # Node
//!
//! A participant on the fabric. The node owns the peer table and every
//! subsystem instance, and is the handle shared values are created on.
//!
//! ## Startup Order
//!
//! ```text
//! 1. RPC server + publisher bind        (ports known)
//! 2. Headers advertised on the fabric   (rpc_proto/rpc_port/pub_proto/pub_port)
//! 3. Survey + event engines, handlers   (SURVEY group joined)
//! 4. Fabric started                     (peers start entering)
//! 5. Event loop spawned
//! ```
//!
//! Cloning a `Node` is cheap; all clones share one runtime.

use super::config::NodeConfig;
use crate::errors::NodeError;
use crate::handlers::{
    HistorySurvey, LastValueSurvey, MetadataSurvey, StaticTagsSurvey, ValueEnteringEvent, ValueMetadataUpdateEvent,
    ValueUriSurvey, ValuesMetadataSurvey, EVENT_VALUE_ENTERING, EVENT_VALUE_METADATA_UPDATE, SURVEY_LAST_VALUE,
    SURVEY_VALUES_METADATA, SURVEY_VALUE_HISTORY, SURVEY_VALUE_METADATA, SURVEY_VALUE_STATIC_TAGS, SURVEY_VALUE_URI,
};
use crate::registry::ValueRegistry;
use crate::value::ValueSnapshot;
use crate::wiring;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::{json, Map, Value};
use shared_bus::ObserverId;
use shared_types::{
    Metadata, NodeIdentity, PeerId, Tags, Timestamp, PUB_PORT_HEADER, PUB_PROTO_HEADER, RPC_PORT_HEADER,
    RPC_PROTO_HEADER,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vm_01_peer_fabric::{PeerEndpoints, PeerFabric};
use vm_02_survey::{SurveyEngine, SurveyOptions};
use vm_03_event::EventEngine;
use vm_04_rpc::{Procedure, ProcedureTable, RpcClientPool, RpcServer};
use vm_05_pubsub::{Publisher, Subscriber};

#[allow(clippy::expect_used)]
fn rpc_uri_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^rpc://(.*?)/(.*)$").expect("static pattern compiles"))
}

/// Split `rpc://<peer>/<procedure>` into its parts.
#[must_use]
pub fn parse_rpc_uri(uri: &str) -> Option<(&str, &str)> {
    let captures = rpc_uri_pattern().captures(uri)?;
    match (captures.get(1), captures.get(2)) {
        (Some(peer), Some(procedure)) => Some((peer.as_str(), procedure.as_str())),
        _ => None,
    }
}

/// Result of a last-value survey.
pub type LastValue = ValueSnapshot;

/// A peer as seen by this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub name: String,
    /// `None` when the peer's headers could not be turned into endpoints.
    pub endpoints: Option<PeerEndpoints>,
    /// Both the RPC and the pub/sub channel are open.
    pub connected: bool,
}

/// Which URIs a values-metadata survey asks about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriSelection {
    Uris(Vec<String>),
    /// Regular expression searched in each hosted URI.
    Pattern(String),
}

pub(crate) struct NodeInner {
    pub(crate) identity: NodeIdentity,
    pub(crate) config: NodeConfig,
    pub(crate) fabric: Arc<dyn PeerFabric>,
    pub(crate) surveys: SurveyEngine,
    pub(crate) events: EventEngine,
    pub(crate) procedures: ProcedureTable,
    pub(crate) rpc_server: RpcServer,
    pub(crate) rpc_clients: RpcClientPool,
    pub(crate) publisher: Publisher,
    pub(crate) subscriber: Subscriber,
    pub(crate) values: Arc<ValueRegistry>,
    pub(crate) value_entering: Arc<ValueEnteringEvent>,
    pub(crate) peers: RwLock<HashMap<PeerId, PeerInfo>>,
    pub(crate) ready: watch::Sender<usize>,
    pub(crate) shutdown: watch::Sender<bool>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl NodeInner {
    pub(crate) fn refresh_ready_count(&self) {
        let ready = self.peers.read().values().filter(|peer| peer.connected).count();
        self.ready.send_replace(ready);
    }
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        if !self.shutdown.send_replace(true) {
            self.fabric.stop();
            self.rpc_clients.close_all();
        }
    }
}

/// Handle to a running node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Bind the transports, advertise them on `fabric` and start it.
    pub async fn start(fabric: Arc<dyn PeerFabric>, config: NodeConfig) -> Result<Self, NodeError> {
        let identity = NodeIdentity::new(fabric.name(), fabric.uuid());

        let procedures = ProcedureTable::new();
        let rpc_server = RpcServer::bind(&config.rpc, procedures.clone()).await?;
        let publisher = Publisher::bind(&config.pubsub).await?;

        fabric.set_header(RPC_PROTO_HEADER, "tcp");
        fabric.set_header(RPC_PORT_HEADER, &rpc_server.port().to_string());
        fabric.set_header(PUB_PROTO_HEADER, "tcp");
        fabric.set_header(PUB_PORT_HEADER, &publisher.port().to_string());

        let values = Arc::new(ValueRegistry::new());
        let subscriber = Subscriber::new(config.pubsub.clone(), wiring::value_update_handler(values.clone()));

        let surveys = SurveyEngine::new(fabric.clone(), config.survey.clone());
        surveys.register(Arc::new(ValueUriSurvey::new(values.clone())));
        surveys.register(Arc::new(LastValueSurvey::new(values.clone())));
        surveys.register(Arc::new(StaticTagsSurvey::new(values.clone())));
        surveys.register(Arc::new(MetadataSurvey::new(values.clone(), identity.clone())));
        surveys.register(Arc::new(ValuesMetadataSurvey::new(values.clone())));
        surveys.register(Arc::new(HistorySurvey::new(values.clone(), procedures.clone())));

        let events = EventEngine::new(fabric.clone());
        let value_entering = Arc::new(ValueEnteringEvent::new());
        events.register(value_entering.clone());
        events.register(Arc::new(ValueMetadataUpdateEvent::new(values.clone())));

        let fabric_events = fabric.start()?;
        let (ready, _) = watch::channel(0);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(NodeInner {
            identity,
            rpc_clients: RpcClientPool::new(config.rpc.clone()),
            config,
            fabric,
            surveys,
            events,
            procedures,
            rpc_server,
            publisher,
            subscriber,
            values,
            value_entering,
            peers: RwLock::new(HashMap::new()),
            ready,
            shutdown,
            event_loop: Mutex::new(None),
        });
        let task = tokio::spawn(wiring::run_event_loop(
            Arc::downgrade(&inner),
            fabric_events,
            shutdown_rx,
        ));
        *inner.event_loop.lock() = Some(task);

        info!(
            node = %inner.identity.peer_name,
            uuid = %inner.identity.peer_uuid,
            rpc_port = inner.rpc_server.port(),
            pub_port = inner.publisher.port(),
            "Node started"
        );
        Ok(Self { inner })
    }

    pub(crate) fn inner(&self) -> &Arc<NodeInner> {
        &self.inner
    }

    // =========================================================================
    // IDENTITY
    // =========================================================================

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.identity.peer_name
    }

    #[must_use]
    pub fn uuid(&self) -> PeerId {
        self.inner.fabric.uuid()
    }

    /// `{peer_name, peer_uuid}` provenance stamp.
    #[must_use]
    pub fn name_uuid(&self) -> NodeIdentity {
        self.inner.identity.clone()
    }

    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn rpc_port(&self) -> u16 {
        self.inner.rpc_server.port()
    }

    #[must_use]
    pub fn pub_port(&self) -> u16 {
        self.inner.publisher.port()
    }

    // =========================================================================
    // PEERS
    // =========================================================================

    /// Known peers, sorted by name.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self.inner.peers.read().values().cloned().collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        peers
    }

    /// Wait until at least `count` peers are connected. Returns `false` on timeout.
    pub async fn wait_for_peers(&self, count: usize, timeout: Duration) -> bool {
        let mut ready = self.inner.ready.subscribe();
        tokio::time::timeout(timeout, ready.wait_for(|connected| *connected >= count))
            .await
            .is_ok_and(|result| result.is_ok())
    }

    // =========================================================================
    // RPC
    // =========================================================================

    /// Register a procedure and return its `rpc://<node>/<name>` URI.
    pub fn add_rpc(&self, name: &str, procedure: Procedure) -> Result<String, NodeError> {
        self.inner.procedures.register(name, procedure)?;
        Ok(format!("rpc://{}/{}", self.name(), name))
    }

    pub fn remove_rpc(&self, name: &str) -> bool {
        self.inner.procedures.unregister(name)
    }

    /// Call `rpc://<peer>/<procedure>` on a connected peer.
    pub async fn call_rpc(&self, uri: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<Value, NodeError> {
        let (peer, procedure) = parse_rpc_uri(uri).ok_or_else(|| NodeError::InvalidRpcUri(uri.to_string()))?;
        Ok(self.inner.rpc_clients.call_on(peer, procedure, args, kwargs).await?)
    }

    /// Call a procedure by peer name.
    pub async fn call_on(
        &self,
        peer_name: &str,
        procedure: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, NodeError> {
        Ok(self.inner.rpc_clients.call_on(peer_name, procedure, args, kwargs).await?)
    }

    // =========================================================================
    // SURVEYS
    // =========================================================================

    async fn ask(
        &self,
        survey: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        options: SurveyOptions,
    ) -> Result<Value, NodeError> {
        Ok(self.inner.surveys.ask(survey, args, kwargs, options).await?)
    }

    /// URIs hosted by peers that match `pattern` anywhere.
    pub async fn survey_value_uri(&self, pattern: &str, options: SurveyOptions) -> Result<BTreeSet<String>, NodeError> {
        let result = self.ask(SURVEY_VALUE_URI, vec![json!(pattern)], Map::new(), options).await?;
        Ok(result
            .as_array()
            .map(|uris| uris.iter().filter_map(|uri| uri.as_str().map(str::to_string)).collect())
            .unwrap_or_default())
    }

    /// Freshest value of `uri` among responders; null at the epoch if nobody answered.
    pub async fn survey_last_value(&self, uri: &str, options: SurveyOptions) -> Result<LastValue, NodeError> {
        let result = self.ask(SURVEY_LAST_VALUE, vec![json!(uri)], Map::new(), options).await?;
        Ok(ValueSnapshot::from_wire(&result).unwrap_or_else(|| {
            warn!(uri, %result, "Unreadable last value, using the never-set value");
            ValueSnapshot {
                value: Value::Null,
                timestamp: Timestamp::epoch(),
                tags: Tags::new(),
            }
        }))
    }

    pub async fn survey_value_static_tags(&self, uri: &str, options: SurveyOptions) -> Result<Tags, NodeError> {
        match self.ask(SURVEY_VALUE_STATIC_TAGS, vec![json!(uri)], Map::new(), options).await? {
            Value::Object(tags) => Ok(tags),
            _ => Ok(Tags::new()),
        }
    }

    /// Metadata of `uri` and the identity of the peer that answered.
    pub async fn survey_value_metadata(
        &self,
        uri: &str,
        options: SurveyOptions,
    ) -> Result<(Option<Metadata>, Option<NodeIdentity>), NodeError> {
        let result = self.ask(SURVEY_VALUE_METADATA, vec![json!(uri)], Map::new(), options).await?;
        let metadata = match result.get(0) {
            Some(Value::Object(metadata)) if !metadata.is_empty() => Some(metadata.clone()),
            _ => None,
        };
        let source = result.get(1).and_then(NodeIdentity::from_payload);
        Ok((metadata, source))
    }

    /// Metadata of several URIs, merged across responders.
    pub async fn survey_values_metadata(
        &self,
        selection: UriSelection,
        options: SurveyOptions,
    ) -> Result<BTreeMap<String, Metadata>, NodeError> {
        let (args, is_re) = match selection {
            UriSelection::Uris(uris) => (vec![json!(uris)], false),
            UriSelection::Pattern(pattern) => (vec![json!(pattern)], true),
        };
        let mut kwargs = Map::new();
        kwargs.insert("is_re".into(), Value::Bool(is_re));

        let result = self.ask(SURVEY_VALUES_METADATA, args, kwargs, options).await?;
        let Value::Object(found) = result else {
            return Ok(BTreeMap::new());
        };
        Ok(found
            .into_iter()
            .filter_map(|(uri, metadata)| match metadata {
                Value::Object(metadata) => Some((uri, metadata)),
                _ => None,
            })
            .collect())
    }

    /// Name of a peer that archives `uri`, if any.
    pub async fn survey_value_history(
        &self,
        uri: &str,
        period: (Timestamp, Timestamp),
        options: SurveyOptions,
    ) -> Result<Option<String>, NodeError> {
        let args = vec![
            json!(uri),
            json!([period.0.as_secs_f64(), period.1.as_secs_f64()]),
        ];
        let result = self.ask(SURVEY_VALUE_HISTORY, args, Map::new(), options).await?;
        Ok(result.as_str().map(str::to_string))
    }

    /// Number of surveys this node is still waiting on.
    #[must_use]
    pub fn pending_surveys(&self) -> usize {
        self.inner.surveys.pending().len()
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Announce that this node now hosts `uri`.
    pub fn event_value_entering(&self, uri: &str) -> Result<(), NodeError> {
        Ok(self.inner.events.send(EVENT_VALUE_ENTERING, json!(uri))?)
    }

    /// Tell peers that `uri` has new metadata.
    pub fn event_value_metadata_update(
        &self,
        uri: &str,
        metadata: &Metadata,
        source: &NodeIdentity,
    ) -> Result<(), NodeError> {
        Ok(self
            .inner
            .events
            .send(EVENT_VALUE_METADATA_UPDATE, json!([uri, metadata, source]))?)
    }

    /// Observe values created by peers: `observer(peer_name, uri)`.
    pub fn register_value_entering<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(String, String) + Send + Sync + 'static,
    {
        let id = self.inner.value_entering.subscribe(observer);
        self.inner.events.acquire_group();
        id
    }

    pub fn unregister_value_entering(&self, id: ObserverId) -> bool {
        if self.inner.value_entering.unsubscribe(id) {
            self.inner.events.release_group();
            true
        } else {
            false
        }
    }

    /// Live references keeping this node in the `EVENT` group.
    #[must_use]
    pub fn event_group_references(&self) -> usize {
        self.inner.events.group_references()
    }

    // =========================================================================
    // VALUES
    // =========================================================================

    /// URIs of the values hosted on this node.
    #[must_use]
    pub fn hosted_values(&self) -> Vec<String> {
        self.inner.values.uris()
    }

    pub(crate) fn publish(&self, uri: &str, snapshot: &ValueSnapshot) -> Result<usize, NodeError> {
        Ok(self.inner.publisher.publish(uri, snapshot.to_wire())?)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Leave the fabric and close every channel. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }
        info!(node = %self.name(), "Shutting down node");

        self.inner.fabric.stop();
        self.inner.rpc_server.shutdown();
        self.inner.rpc_clients.close_all();
        self.inner.publisher.shutdown();
        self.inner.subscriber.close_all();

        let task = self.inner.event_loop.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.inner.peers.write().clear();
        self.inner.ready.send_replace(0);

        tokio::time::sleep(self.inner.config.shutdown_grace).await;
        info!(node = %self.name(), "Node stopped");
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.inner.identity.peer_name)
            .field("uuid", &self.inner.identity.peer_uuid)
            .field("peers", &self.inner.peers.read().len())
            .field("values", &self.inner.values.len())
            .finish()
    }
}
