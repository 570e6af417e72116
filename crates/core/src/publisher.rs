//! Fan-out of tick batches to patient-stream subscribers.
//!
//! Every subscriber owns a bounded queue. One publish step offers the same batch to every queue
//! with `try_send` and never waits: a full queue loses that batch for that subscriber alone, and
//! a closed queue unregisters its subscriber. The poll loop therefore never stalls on a slow
//! client, and clients never steal events from each other.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::diff::ChangeEvent;
use crate::{ErError, ErResult};

/// All events derived from one poll tick, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickBatch {
    /// Sequence number of the tick that produced the batch. Strictly increasing.
    pub tick: u64,
    pub events: Vec<ChangeEvent>,
}

/// Identifies one patient-stream subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

type BatchSender = mpsc::Sender<Arc<TickBatch>>;

/// Registry of live subscriber queues.
pub struct Publisher {
    capacity: usize,
    subscribers: Mutex<HashMap<SubscriptionId, BatchSender>>,
    dropped_batches: AtomicU64,
    closed: AtomicBool,
}

impl Publisher {
    /// Create a publisher whose subscriber queues hold `capacity` batches each.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(HashMap::new()),
            dropped_batches: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Register a new subscriber. It receives every batch published from now on.
    ///
    /// Subscribing to a closed publisher yields a subscription that reports
    /// [`ErError::FeedClosed`] on its first receive.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = SubscriptionId::new();
        let (tx, rx) = mpsc::channel(self.capacity);

        // Checked under the lock so a concurrent `close` cannot miss this queue.
        let mut subscribers = self.lock();
        if !self.closed.load(Ordering::Acquire) {
            subscribers.insert(id, tx);
            debug!(subscription = %id, "patient subscriber registered");
        }
        drop(subscribers);

        Subscription {
            id,
            rx,
            publisher: Arc::downgrade(self),
            unregistered: AtomicBool::new(false),
        }
    }

    /// Offer `batch` to every subscriber. Returns how many queues accepted it.
    pub fn publish(&self, batch: TickBatch) -> usize {
        let batch = Arc::new(batch);
        let mut delivered = 0;
        let mut gone = Vec::new();

        let mut subscribers = self.lock();
        for (id, tx) in subscribers.iter() {
            match tx.try_send(Arc::clone(&batch)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.dropped_batches.fetch_add(1, Ordering::Relaxed);
                    warn!(subscription = %id, tick = batch.tick, "subscriber queue full; batch dropped");
                }
                Err(TrySendError::Closed(_)) => gone.push(*id),
            }
        }
        for id in gone {
            subscribers.remove(&id);
            debug!(subscription = %id, "patient subscriber queue closed; unregistered");
        }

        delivered
    }

    /// Drop every subscriber queue and refuse new registrations.
    pub fn close(&self) {
        let mut subscribers = self.lock();
        self.closed.store(true, Ordering::Release);
        subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Batches lost to full subscriber queues since startup.
    pub fn dropped_batches(&self) -> u64 {
        self.dropped_batches.load(Ordering::Relaxed)
    }

    fn unregister(&self, id: SubscriptionId) {
        if self.lock().remove(&id).is_some() {
            debug!(subscription = %id, "patient subscriber unregistered");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionId, BatchSender>> {
        // The map stays consistent even if a holder panicked; keep serving.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("capacity", &self.capacity)
            .field("subscriber_count", &self.subscriber_count())
            .field("dropped_batches", &self.dropped_batches())
            .finish()
    }
}

/// Receiving end of one subscriber queue.
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<Arc<TickBatch>>,
    publisher: Weak<Publisher>,
    unregistered: AtomicBool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next batch.
    ///
    /// # Errors
    ///
    /// Returns [`ErError::FeedClosed`] once the publisher closed or dropped this queue.
    pub async fn recv(&mut self) -> ErResult<Arc<TickBatch>> {
        self.rx.recv().await.ok_or(ErError::FeedClosed)
    }

    /// Remove this subscriber from the publisher. Idempotent.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(publisher) = self.publisher.upgrade() {
            publisher.unregister(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
