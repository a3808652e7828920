//! # Survey Service
//!
//! `SurveyEngine` issues asks on the local node and answers the asks of
//! peers. It is driven by the node's fabric loop through `on_request`
//! and `on_reply`; `ask` may be awaited from any task concurrently.

use crate::domain::{PendingTable, RecordOutcome, Reply, SurveyConfig, SurveyError, SurveyOptions};
use crate::ports::{SurveyContext, SurveyHandler};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use shared_types::{PeerId, SurveyReply, SurveyRequest, WireFrame, SURVEY_GROUP};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use vm_01_peer_fabric::PeerFabric;

/// Name → handler table, built once at node start.
#[derive(Default, Clone)]
pub struct SurveyRegistry {
    handlers: HashMap<String, Arc<dyn SurveyHandler>>,
}

impl SurveyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any handler of the same name.
    pub fn register(&mut self, handler: Arc<dyn SurveyHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn SurveyHandler>> {
        self.handlers.get(name).cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for SurveyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurveyRegistry").field("handlers", &self.names()).finish()
    }
}

/// Broadcast/collect correlation engine.
pub struct SurveyEngine {
    fabric: Arc<dyn PeerFabric>,
    registry: RwLock<SurveyRegistry>,
    pending: PendingTable,
    config: SurveyConfig,
}

impl SurveyEngine {
    /// Create an engine and join the `SURVEY` group so peers' asks reach us.
    #[must_use]
    pub fn new(fabric: Arc<dyn PeerFabric>, config: SurveyConfig) -> Self {
        fabric.join(SURVEY_GROUP);
        Self {
            fabric,
            registry: RwLock::new(SurveyRegistry::new()),
            pending: PendingTable::new(),
            config,
        }
    }

    pub fn register(&self, handler: Arc<dyn SurveyHandler>) {
        debug!(survey = handler.name(), "Registering survey handler");
        self.registry.write().register(handler);
    }

    #[must_use]
    pub fn handler(&self, name: &str) -> Option<Arc<dyn SurveyHandler>> {
        self.registry.read().get(name)
    }

    /// Outstanding request table (exposed for leak checks).
    #[must_use]
    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    #[must_use]
    pub fn config(&self) -> &SurveyConfig {
        &self.config
    }

    /// Ask peers and reduce their answers with the handler's `process_result`.
    pub async fn ask(
        &self,
        function: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        options: SurveyOptions,
    ) -> Result<Value, SurveyError> {
        let handler = self
            .handler(function)
            .ok_or_else(|| SurveyError::UnknownSurvey(function.to_string()))?;
        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        let limit = options.limit_peers.unwrap_or_else(|| handler.default_limit_peers());

        let replies = self.collect(function, args, kwargs, timeout, limit).await?;
        Ok(handler.process_result(replies))
    }

    /// Broadcast a request and gather raw `(peer_name, data)` replies.
    ///
    /// Returns as soon as `limit` replies arrived, or when `timeout`
    /// elapses. `limit == 0` always waits the full timeout.
    pub async fn collect(
        &self,
        function: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        timeout: Duration,
        limit: usize,
    ) -> Result<Vec<Reply>, SurveyError> {
        let (guard, done) = self.pending.open(limit);
        let request = SurveyRequest {
            req_id: guard.id().clone(),
            function: function.to_string(),
            args,
            kwargs,
        };
        self.fabric.shout(SURVEY_GROUP, request.encode()?)?;
        debug!(survey = function, request_id = %request.req_id, limit, "Survey issued");

        let satisfied = tokio::time::timeout(timeout, done).await.is_ok();
        let replies = guard.retire();
        debug!(
            survey = function,
            request_id = %request.req_id,
            replies = replies.len(),
            satisfied,
            "Survey retired"
        );
        Ok(replies)
    }

    /// A peer answered one of our asks.
    pub fn on_reply(&self, peer_name: &str, payload: &[u8]) {
        let reply = match SurveyReply::decode(payload) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(peer = peer_name, error = %e, "Dropping malformed survey reply");
                return;
            }
        };
        match self.pending.record(&reply.req_id, peer_name, reply.data) {
            RecordOutcome::Unknown => {
                warn!(peer = peer_name, request_id = %reply.req_id, "Reply for unknown or expired survey");
            }
            RecordOutcome::Collecting(count) => {
                debug!(peer = peer_name, request_id = %reply.req_id, count, "Survey reply");
            }
            RecordOutcome::Satisfied => {
                debug!(peer = peer_name, request_id = %reply.req_id, "Survey satisfied");
            }
        }
    }

    /// A peer asked the group something. Answer by whisper, or stay silent.
    pub fn on_request(&self, peer: PeerId, peer_name: &str, payload: &[u8]) {
        let request = match SurveyRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(peer = peer_name, error = %e, "Dropping malformed survey request");
                return;
            }
        };
        let Some(handler) = self.handler(&request.function) else {
            warn!(peer = peer_name, survey = %request.function, "No handler for survey");
            return;
        };

        let ctx = SurveyContext {
            peer,
            peer_name: peer_name.to_string(),
            req_id: request.req_id.clone(),
        };
        let answer = catch_unwind(AssertUnwindSafe(|| {
            handler.process_request(&ctx, &request.args, &request.kwargs)
        }));
        let data = match answer {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(peer = peer_name, survey = %request.function, "Nothing to answer");
                return;
            }
            Err(_) => {
                error!(peer = peer_name, survey = %request.function, "Survey handler panicked");
                return;
            }
        };

        let reply = SurveyReply {
            req_id: request.req_id,
            data,
        };
        let sent = reply
            .encode()
            .map_err(SurveyError::from)
            .and_then(|bytes| self.fabric.whisper(peer, bytes).map_err(SurveyError::from));
        if let Err(e) = sent {
            warn!(peer = peer_name, request_id = %reply.req_id, error = %e, "Failed to send survey reply");
        }
    }
}

impl std::fmt::Debug for SurveyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurveyEngine")
            .field("node", &self.fabric.name())
            .field("pending", &self.pending.len())
            .field("config", &self.config)
            .finish()
    }
}
