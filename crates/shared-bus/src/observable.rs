//! # Observable
//!
//! A set of callbacks notified asynchronously.

use parking_lot::RwLock;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A registered callback.
pub type Observer<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Handle returned by [`Observable::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// A set of observers notified with fire-and-forget semantics.
///
/// Every instance starts empty; observer sets are never shared between
/// owners.
pub struct Observable<T> {
    observers: RwLock<Vec<(ObserverId, Observer<T>)>>,
    next_id: AtomicU64,
    notifications: AtomicU64,
}

impl<T> Observable<T>
where
    T: Clone + Send + 'static,
{
    /// Create an empty observable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            notifications: AtomicU64::new(0),
        }
    }

    /// Register a callback.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, Arc::new(observer)));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        before != observers.len()
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Whether no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Total number of `notify` calls made on this observable.
    #[must_use]
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Dispatch `args` to every observer on its own task.
    ///
    /// Returns the number of observers dispatched to. Outside a tokio
    /// runtime the observers are called inline; a panic in one of them is
    /// caught and logged so it never reaches the caller.
    pub fn notify(&self, args: T) -> usize {
        self.notifications.fetch_add(1, Ordering::Relaxed);

        let observers: Vec<Observer<T>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        let count = observers.len();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                for observer in observers {
                    let args = args.clone();
                    handle.spawn(async move { observer(args) });
                }
            }
            Err(_) => {
                warn!("No async runtime available, notifying observers inline");
                for observer in observers {
                    let args = args.clone();
                    if panic::catch_unwind(AssertUnwindSafe(|| observer(args))).is_err() {
                        error!("Observer panicked");
                    }
                }
            }
        }

        debug!(observers = count, "Observers notified");
        count
    }
}

impl<T> Default for Observable<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("observers", &self.observers.read().len())
            .finish()
    }
}
