//! # RPC Client
//!
//! One TCP connection per peer. Calls are multiplexed by request id, so
//! any number of tasks can call the same peer concurrently. A call has
//! no implicit timeout; it ends with a reply or with the connection.
//!
//! A reply that cannot be matched to a request (no boundary, no request
//! id) resolves the only call in flight to `null`. With several calls in
//! flight there is no telling whose reply it was, so the connection is
//! dropped and every waiter fails with `ConnectionClosed`.

use crate::codec::{self, Multipart, MultipartFraming};
use crate::domain::{ReplyStatus, RpcConfig, RpcError, RpcReply, RpcRequest};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use shared_types::{PeerId, RequestId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Waiter = oneshot::Sender<Result<Value, RpcError>>;

/// Outstanding calls; `None` once the connection is gone.
type PendingCalls = Arc<Mutex<Option<HashMap<RequestId, Waiter>>>>;

/// Connection to one peer's RPC server.
pub struct RpcClient {
    peer_name: String,
    address: String,
    outbound: mpsc::UnboundedSender<Multipart>,
    pending: PendingCalls,
    task: JoinHandle<()>,
}

impl RpcClient {
    /// Connect to `address` (`host:port`).
    pub async fn connect(peer_name: &str, address: &str, config: &RpcConfig) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        let framing = codec::framed(stream, config.max_frame_length);

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let pending: PendingCalls = Arc::new(Mutex::new(Some(HashMap::new())));
        let task = tokio::spawn(run_connection(
            framing,
            outbound_rx,
            pending.clone(),
            peer_name.to_string(),
        ));
        debug!(peer = peer_name, address, "RPC client connected");

        Ok(Self {
            peer_name: peer_name.to_string(),
            address: address.to_string(),
            outbound,
            pending,
            task,
        })
    }

    #[must_use]
    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pending.lock().is_none()
    }

    /// Number of calls awaiting a reply.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.lock().as_ref().map_or(0, HashMap::len)
    }

    /// Call `procedure` on the peer and wait for its reply.
    pub async fn call(
        &self,
        procedure: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, RpcError> {
        let (tx, rx) = oneshot::channel();
        let req_id = {
            let mut guard = self.pending.lock();
            let calls = guard.as_mut().ok_or(RpcError::ConnectionClosed)?;
            let mut id = RequestId::generate();
            while calls.contains_key(&id) {
                id = RequestId::generate();
            }
            calls.insert(id.clone(), tx);
            id
        };
        let _retire = CallGuard {
            pending: &self.pending,
            id: &req_id,
        };

        let request = RpcRequest {
            route: Vec::new(),
            req_id: req_id.clone(),
            procedure: procedure.to_string(),
            args,
            kwargs,
        };
        self.outbound
            .send(request.to_parts()?)
            .map_err(|_| RpcError::ConnectionClosed)?;

        rx.await.map_err(|_| RpcError::ConnectionClosed)?
    }

    /// Drop the connection; calls in flight fail with `ConnectionClosed`.
    pub fn close(&self) {
        self.task.abort();
        fail_all(&self.pending);
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("peer_name", &self.peer_name)
            .field("address", &self.address)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Removes a call's waiter when the call ends for any reason.
struct CallGuard<'a> {
    pending: &'a PendingCalls,
    id: &'a RequestId,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if let Some(calls) = self.pending.lock().as_mut() {
            calls.remove(self.id);
        }
    }
}

fn fail_all(pending: &PendingCalls) {
    if let Some(calls) = pending.lock().take() {
        for (_, waiter) in calls {
            let _ = waiter.send(Err(RpcError::ConnectionClosed));
        }
    }
}

async fn run_connection(
    framing: MultipartFraming,
    mut outbound: mpsc::UnboundedReceiver<Multipart>,
    pending: PendingCalls,
    peer_name: String,
) {
    let (mut sink, mut frames) = framing.split();
    loop {
        tokio::select! {
            request = outbound.recv() => match request {
                Some(parts) => {
                    if let Err(e) = sink.send(parts).await {
                        warn!(peer = %peer_name, error = %e, "Failed to send RPC request");
                        break;
                    }
                }
                None => break,
            },
            frame = frames.next() => match frame {
                Some(Ok(parts)) => {
                    if !resolve(&pending, &peer_name, &parts) {
                        warn!(peer = %peer_name, "Unaddressed RPC reply with several calls in flight, closing");
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(peer = %peer_name, error = %e, "RPC connection error");
                    break;
                }
                None => {
                    debug!(peer = %peer_name, "RPC connection closed by peer");
                    break;
                }
            },
        }
    }
    fail_all(&pending);
}

/// Hand a reply to its waiter. Returns `false` if the reply cannot be
/// attributed and the connection must be closed.
fn resolve(pending: &PendingCalls, peer_name: &str, parts: &[bytes::Bytes]) -> bool {
    let (req_id, outcome) = match RpcReply::from_parts(parts) {
        Ok(reply) => {
            let outcome = match reply.status {
                ReplyStatus::Ok(value) => Ok(value),
                ReplyStatus::Fail(err) => Err(RpcError::Remote(err)),
            };
            (reply.req_id, outcome)
        }
        Err(malformed) => {
            error!(peer = peer_name, reason = %malformed.reason, "Bad RPC reply");
            let Some(req_id) = malformed.req_id else {
                return resolve_unaddressed(pending, peer_name);
            };
            let outcome = match malformed.bad_status {
                Some(status) => Err(RpcError::BadStatus(status)),
                None => Ok(Value::Null),
            };
            (req_id, outcome)
        }
    };

    let waiter = pending.lock().as_mut().and_then(|calls| calls.remove(&req_id));
    match waiter {
        Some(waiter) => {
            let _ = waiter.send(outcome);
        }
        None => warn!(peer = peer_name, request_id = %req_id, "RPC reply for unknown call"),
    }
    true
}

fn resolve_unaddressed(pending: &PendingCalls, peer_name: &str) -> bool {
    let mut guard = pending.lock();
    let Some(calls) = guard.as_mut() else {
        return true;
    };
    match calls.len() {
        0 => true,
        1 => {
            let id = calls.keys().next().cloned();
            if let Some(waiter) = id.and_then(|id| calls.remove(&id)) {
                debug!(peer = peer_name, "Unaddressed RPC reply resolves the only call in flight");
                let _ = waiter.send(Ok(Value::Null));
            }
            true
        }
        _ => false,
    }
}

// =============================================================================
// CLIENT POOL
// =============================================================================

/// The RPC clients of one node, keyed by peer name.
///
/// Peer names are not guaranteed unique; the most recent peer to connect
/// under a name wins, and a disconnect only removes the client if it
/// still belongs to the departing peer.
#[derive(Debug, Default)]
pub struct RpcClientPool {
    clients: RwLock<HashMap<String, (PeerId, Arc<RpcClient>)>>,
    config: RpcConfig,
}

impl RpcClientPool {
    #[must_use]
    pub fn new(config: RpcConfig) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Open (or replace) the connection to a peer.
    pub async fn connect(&self, peer: PeerId, peer_name: &str, address: &str) -> Result<(), RpcError> {
        let client = Arc::new(RpcClient::connect(peer_name, address, &self.config).await?);
        let previous = self.clients.write().insert(peer_name.to_string(), (peer, client));
        if let Some((_, old)) = previous {
            old.close();
        }
        info!(peer = peer_name, address, "RPC channel to peer established");
        Ok(())
    }

    /// Close the connection to a departing peer.
    pub fn disconnect(&self, peer: PeerId, peer_name: &str) -> bool {
        let mut clients = self.clients.write();
        match clients.get(peer_name) {
            Some((id, _)) if *id == peer => {
                if let Some((_, client)) = clients.remove(peer_name) {
                    client.close();
                }
                info!(peer = peer_name, "RPC channel to peer closed");
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn contains(&self, peer_name: &str) -> bool {
        self.clients.read().contains_key(peer_name)
    }

    #[must_use]
    pub fn peer_names(&self) -> Vec<String> {
        self.clients.read().keys().cloned().collect()
    }

    /// Call a procedure on a named peer.
    pub async fn call_on(
        &self,
        peer_name: &str,
        procedure: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, RpcError> {
        let client = self
            .clients
            .read()
            .get(peer_name)
            .map(|(_, client)| client.clone())
            .ok_or_else(|| RpcError::UnknownPeer(peer_name.to_string()))?;
        client.call(procedure, args, kwargs).await
    }

    /// Close every connection.
    pub fn close_all(&self) {
        for (_, (_, client)) in self.clients.write().drain() {
            client.close();
        }
    }
}
