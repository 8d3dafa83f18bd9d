//! Fan-out of fleet snapshots to live subscribers.
//!
//! Every subscriber owns a bounded [`mpsc`] queue. [`Broadcaster::publish`]
//! offers the snapshot to each queue with `try_send`, so publishing never
//! waits on a subscriber. A subscriber whose queue is full (stalled) or
//! whose receiving side is gone (disconnected) is removed on the spot; the
//! remaining subscribers are unaffected.
//!
//! Snapshots are shared as `Arc<FleetSnapshot>` so fan-out costs one
//! reference-count increment per subscriber.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use robofleet_types::{FleetSnapshot, SubscriberId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Outcome of a single [`Broadcaster::publish`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that had the snapshot queued.
    pub delivered: usize,
    /// Subscribers removed during this publish.
    pub dropped: Vec<SubscriberId>,
}

#[derive(Debug)]
struct Registry {
    subscribers: Mutex<BTreeMap<SubscriberId, mpsc::Sender<Arc<FleetSnapshot>>>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Registry {
    fn remove(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }
}

/// Registry of live subscribers.
///
/// Cheap to clone; clones share the same registry.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    /// Create a broadcaster with `capacity` queued snapshots per subscriber.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                subscribers: Mutex::new(BTreeMap::new()),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a new subscriber.
    ///
    /// The subscriber only sees snapshots published after this call. After
    /// [`close`](Self::close) the returned subscription is already ended.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(self.registry.capacity);

        if self.registry.closed.load(Ordering::Acquire) {
            drop(tx);
        } else {
            self.registry.subscribers.lock().insert(id, tx);
            debug!(subscriber_id = %id, "subscriber registered");
        }

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove a subscriber. Returns whether it was still registered.
    ///
    /// Unsubscribing an unknown or already removed subscriber is a no-op.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            debug!(subscriber_id = %id, "subscriber unregistered");
        }
        removed
    }

    /// Offer a snapshot to every registered subscriber without waiting.
    pub fn publish(&self, snapshot: impl Into<Arc<FleetSnapshot>>) -> PublishReport {
        let snapshot = snapshot.into();
        let mut report = PublishReport::default();
        let mut subscribers = self.registry.subscribers.lock();

        subscribers.retain(|id, tx| match tx.try_send(Arc::clone(&snapshot)) {
            Ok(()) => {
                report.delivered = report.delivered.saturating_add(1);
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(subscriber_id = %id, "subscriber stalled, dropping");
                report.dropped.push(*id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber_id = %id, "subscriber disconnected, dropping");
                report.dropped.push(*id);
                false
            }
        });

        report
    }

    /// Remove every subscriber and refuse new ones.
    ///
    /// Each subscription drains what is already queued, then ends.
    pub fn close(&self) {
        self.registry.closed.store(true, Ordering::Release);
        let removed = std::mem::take(&mut *self.registry.subscribers.lock());
        debug!(subscribers = removed.len(), "broadcaster closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.registry.closed.load(Ordering::Acquire)
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers.lock().len()
    }
}

/// Receiving side of one subscriber. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<FleetSnapshot>>,
    registry: Weak<Registry>,
}

impl Subscription {
    /// This subscriber's identifier.
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next snapshot.
    ///
    /// Returns `None` once the subscriber has been removed and its queue
    /// is drained.
    pub async fn recv(&mut self) -> Option<Arc<FleetSnapshot>> {
        self.rx.recv().await
    }

    /// Take the next snapshot if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<FleetSnapshot>> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting snapshots, as when the transport behind it fails.
    ///
    /// The next publish finds the queue closed and drops this subscriber.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.id) {
                debug!(subscriber_id = %self.id, "subscription dropped");
            }
        }
    }
}
