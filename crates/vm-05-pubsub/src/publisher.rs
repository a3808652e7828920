use crate::config::PubSubConfig;
use crate::errors::PubSubError;
use crate::frame::PubSubFrame;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, trace, warn};

/// Fans published messages out to every connected subscriber.
pub struct Publisher {
    local_addr: SocketAddr,
    fanout: broadcast::Sender<Bytes>,
    shutdown: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Publisher {
    pub async fn bind(config: &PubSubConfig) -> Result<Self, PubSubError> {
        let listener = TcpListener::bind((config.bind_address.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        let (fanout, _) = broadcast::channel(config.channel_capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            fanout.clone(),
            config.max_frame_length,
            shutdown_rx,
        ));
        info!(%local_addr, "Publisher listening");

        Ok(Self {
            local_addr,
            fanout,
            shutdown,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Number of connected subscribers.
    #[must_use]
    pub fn subscribers(&self) -> usize {
        self.fanout.receiver_count()
    }

    /// Publish `data` under `topic`. Returns how many subscribers it was queued for.
    pub fn publish(&self, topic: &str, data: Value) -> Result<usize, PubSubError> {
        if *self.shutdown.borrow() {
            return Err(PubSubError::Closed);
        }
        let frame = PubSubFrame::Message {
            topic: topic.to_string(),
            data,
        }
        .to_bytes()?;
        let queued = self.fanout.send(frame).unwrap_or(0);
        trace!(topic, queued, "Published");
        Ok(queued)
    }

    /// Stop accepting and close all subscriber connections. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        if self.accept_task.lock().take().is_some() {
            info!(local_addr = %self.local_addr, "Publisher stopped");
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("local_addr", &self.local_addr)
            .field("subscribers", &self.subscribers())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    fanout: broadcast::Sender<Bytes>,
    max_frame_length: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    // register before READY goes out
                    let messages = fanout.subscribe();
                    tokio::spawn(serve_subscriber(stream, remote, messages, max_frame_length, shutdown.clone()));
                }
                Err(e) => warn!(error = %e, "Publisher accept failed"),
            },
        }
    }
    debug!("Publisher accept loop stopped");
}

async fn serve_subscriber(
    stream: TcpStream,
    remote: SocketAddr,
    mut messages: broadcast::Receiver<Bytes>,
    max_frame_length: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_length)
        .new_codec();
    let mut framed = Framed::new(stream, codec);

    let ready = match PubSubFrame::Ready.to_bytes() {
        Ok(ready) => ready,
        Err(e) => {
            warn!(%remote, error = %e, "Failed to encode READY");
            return;
        }
    };
    if let Err(e) = framed.send(ready).await {
        warn!(%remote, error = %e, "Subscriber handshake failed");
        return;
    }
    debug!(%remote, "Subscriber connected");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            message = messages.recv() => match message {
                Ok(frame) => {
                    if let Err(e) = framed.send(frame).await {
                        debug!(%remote, error = %e, "Subscriber write failed");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%remote, skipped, "Subscriber lagging, messages dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = framed.next() => match incoming {
                // subscribers never send after the handshake
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
    debug!(%remote, "Subscriber disconnected");
}
