//! # Pending Request Table
//!
//! One entry per outstanding request: the replies collected so far, the
//! number of replies that completes the request, and the completion
//! signal. Keeping all three in a single entry means retirement is one
//! removal under one lock.
//!
//! Entries are owned by a `PendingGuard`. Dropping the guard retires the
//! entry, so an `ask` whose future is cancelled cannot leak its id.

use parking_lot::Mutex;
use serde_json::Value;
use shared_types::RequestId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// One `(peer_name, data)` answer.
pub type Reply = (String, Value);

#[derive(Debug)]
struct Pending {
    replies: Vec<Reply>,
    limit: usize,
    done: Option<oneshot::Sender<()>>,
}

/// What happened to a recorded reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// No such request (never issued, or already retired).
    Unknown,
    /// Stored; the request is still collecting.
    Collecting(usize),
    /// Stored; this reply reached the limit and completion was signalled.
    Satisfied,
}

/// Shared table of outstanding requests.
#[derive(Debug, Clone, Default)]
pub struct PendingTable {
    inner: Arc<Mutex<HashMap<RequestId, Pending>>>,
}

impl PendingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request under a fresh id.
    ///
    /// The receiver resolves once `limit` replies are recorded. With
    /// `limit == 0` it never resolves while the entry exists.
    #[must_use]
    pub fn open(&self, limit: usize) -> (PendingGuard, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let mut table = self.inner.lock();
        let mut id = RequestId::generate();
        while table.contains_key(&id) {
            id = RequestId::generate();
        }
        table.insert(
            id.clone(),
            Pending {
                replies: Vec::new(),
                limit,
                done: Some(tx),
            },
        );
        drop(table);

        (
            PendingGuard {
                table: self.clone(),
                id,
                retired: false,
            },
            rx,
        )
    }

    /// Record one reply.
    pub fn record(&self, id: &RequestId, peer_name: &str, data: Value) -> RecordOutcome {
        let mut table = self.inner.lock();
        let Some(pending) = table.get_mut(id) else {
            return RecordOutcome::Unknown;
        };
        pending.replies.push((peer_name.to_string(), data));
        let count = pending.replies.len();

        if pending.limit > 0 && count >= pending.limit {
            if let Some(done) = pending.done.take() {
                let _ = done.send(());
                return RecordOutcome::Satisfied;
            }
        }
        RecordOutcome::Collecting(count)
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool {
        self.inner.lock().contains_key(id)
    }

    fn remove(&self, id: &RequestId) -> Vec<Reply> {
        self.inner
            .lock()
            .remove(id)
            .map(|pending| pending.replies)
            .unwrap_or_default()
    }
}

/// Ownership of one pending entry.
#[derive(Debug)]
pub struct PendingGuard {
    table: PendingTable,
    id: RequestId,
    retired: bool,
}

impl PendingGuard {
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Remove the entry and hand back everything collected.
    pub fn retire(mut self) -> Vec<Reply> {
        self.retired = true;
        self.table.remove(&self.id)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if !self.retired {
            self.table.remove(&self.id);
        }
    }
}
