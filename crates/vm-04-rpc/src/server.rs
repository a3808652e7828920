//! # RPC Server
//!
//! Accepts connections from any peer. Each connection reads requests,
//! runs them on the shared bounded executor and writes replies in
//! completion order.

use crate::codec::{self, Multipart};
use crate::domain::{ProcedureError, RemoteError, ReplyStatus, RpcConfig, RpcError, RpcReply, RpcRequest};
use crate::procedure::{Procedure, ProcedureTable};
use futures::{FutureExt, SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct ServerContext {
    procedures: ProcedureTable,
    executor: Arc<Semaphore>,
    max_frame_length: usize,
}

/// A running RPC server.
pub struct RpcServer {
    procedures: ProcedureTable,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl RpcServer {
    /// Bind and start accepting. Procedures may be registered before or after.
    pub async fn bind(config: &RpcConfig, procedures: ProcedureTable) -> Result<Self, RpcError> {
        let listener = TcpListener::bind((config.bind_address.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);

        let ctx = Arc::new(ServerContext {
            procedures: procedures.clone(),
            executor: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            max_frame_length: config.max_frame_length,
        });
        let accept_task = tokio::spawn(accept_loop(listener, ctx, shutdown_rx));
        info!(%local_addr, "RPC server listening");

        Ok(Self {
            procedures,
            local_addr,
            shutdown,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    pub fn register(&self, name: &str, procedure: Procedure) -> Result<(), RpcError> {
        debug!(procedure = name, "Registering RPC procedure");
        self.procedures.register(name, procedure)
    }

    /// Remove a procedure; silent if absent.
    pub fn unregister(&self, name: &str) -> bool {
        self.procedures.unregister(name)
    }

    #[must_use]
    pub fn procedures(&self) -> &ProcedureTable {
        &self.procedures
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting and close every connection. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        if self.accept_task.lock().take().is_some() {
            info!(local_addr = %self.local_addr, "RPC server stopped");
        }
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer")
            .field("local_addr", &self.local_addr)
            .field("procedures", &self.procedures)
            .finish()
    }
}

async fn accept_loop(listener: TcpListener, ctx: Arc<ServerContext>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    debug!(%remote, "RPC connection accepted");
                    tokio::spawn(serve_connection(stream, remote, ctx.clone(), shutdown.clone()));
                }
                Err(e) => warn!(error = %e, "RPC accept failed"),
            },
        }
    }
    debug!("RPC accept loop stopped");
}

async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    ctx: Arc<ServerContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut sink, mut frames) = codec::framed(stream, ctx.max_frame_length).split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Multipart>();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            Some(reply) = reply_rx.recv() => {
                if let Err(e) = sink.send(reply).await {
                    warn!(%remote, error = %e, "Failed to write RPC reply");
                    break;
                }
            }
            frame = frames.next() => match frame {
                Some(Ok(parts)) => ctx.dispatch(parts, reply_tx.clone()).await,
                Some(Err(e)) => {
                    warn!(%remote, error = %e, "RPC connection error");
                    break;
                }
                None => break,
            },
        }
    }
    debug!(%remote, "RPC connection closed");
}

impl ServerContext {
    async fn dispatch(self: &Arc<Self>, parts: Multipart, replies: mpsc::UnboundedSender<Multipart>) {
        let request = match RpcRequest::from_parts(&parts) {
            Ok(request) => request,
            Err(None) => {
                error!(parts = parts.len(), "Bad RPC request without boundary or id");
                return;
            }
            Err(Some(bad)) => {
                error!(request_id = %bad.req_id, reason = %bad.reason, "Bad RPC request");
                let reply = RpcReply {
                    route: bad.route,
                    req_id: bad.req_id,
                    status: ReplyStatus::Fail(RemoteError {
                        kind: "ValueError".to_string(),
                        message: bad.reason,
                        trace: String::new(),
                    }),
                };
                send_reply(&replies, &reply);
                return;
            }
        };

        let Ok(permit) = self.executor.clone().acquire_owned().await else {
            return;
        };
        let ctx = self.clone();
        tokio::spawn(async move {
            debug!(procedure = %request.procedure, request_id = %request.req_id, "RPC call");
            let status = ctx.execute(&request.procedure, request.args, request.kwargs).await;
            drop(permit);
            let reply = RpcReply {
                route: request.route,
                req_id: request.req_id,
                status,
            };
            send_reply(&replies, &reply);
        });
    }

    async fn execute(&self, name: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> ReplyStatus {
        let Some(procedure) = self.procedures.get(name) else {
            warn!(procedure = name, "Unknown RPC procedure");
            return ReplyStatus::Fail(ProcedureError::not_implemented(name).into());
        };

        let call = AssertUnwindSafe(async move { procedure(args, kwargs).await });
        match call.catch_unwind().await {
            Ok(Ok(value)) => ReplyStatus::Ok(value),
            Ok(Err(err)) => {
                error!(procedure = name, error = %err, "RPC procedure failed");
                ReplyStatus::Fail(err.into())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(procedure = name, %message, "RPC procedure panicked");
                ReplyStatus::Fail(RemoteError {
                    kind: "Panic".to_string(),
                    message,
                    trace: String::new(),
                })
            }
        }
    }
}

fn send_reply(replies: &mpsc::UnboundedSender<Multipart>, reply: &RpcReply) {
    match reply.to_parts() {
        Ok(parts) => {
            if replies.send(parts).is_err() {
                debug!(request_id = %reply.req_id, "Connection gone before reply");
            }
        }
        Err(e) => error!(request_id = %reply.req_id, error = %e, "Failed to encode RPC reply"),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
