//! strand-bus - In-process publish/subscribe over engine events.
//!
//! One hub fans [`EngineEvent`]s out to any number of subscribers. The
//! contract:
//!
//! - `publish` never blocks and never awaits; it is safe to call from any
//!   task, including inside tight streaming loops
//! - each subscriber has a bounded queue; a slow subscriber loses its oldest
//!   events and receives a `subscriber.overflow` notice instead of slowing
//!   publishers down
//! - per-subscriber delivery order equals publication order
//! - dropping a [`Subscription`] unsubscribes; dropping the last bus handle
//!   wakes blocked receivers with end-of-stream
//!
//! The registry sits behind a mutex with short critical sections; queues are
//! per-subscriber so publishers contend only on the registry lock.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use strand_protocol::EngineEvent;
use strand_protocol::EventKind;
use tokio::sync::Notify;
use tracing::trace;

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What a subscriber wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event.
    All,
    /// Events scoped to one session.
    Session(String),
    /// Events of one kind.
    Kind(EventKind),
}

impl EventFilter {
    /// Whether an event passes this filter.
    ///
    /// Overflow notices always pass: they are addressed to the subscriber
    /// itself, not to a session.
    pub fn matches(&self, event: &EngineEvent) -> bool {
        if matches!(event.kind(), EventKind::SubscriberOverflow) {
            return true;
        }
        match self {
            EventFilter::All => true,
            EventFilter::Session(id) => event.session_id() == Some(id.as_str()),
            EventFilter::Kind(kind) => event.kind() == *kind,
        }
    }
}

struct SubscriberQueue {
    queue: Mutex<VecDeque<EngineEvent>>,
    notify: Notify,
    capacity: usize,
    /// Total events dropped for this subscriber.
    dropped: AtomicI64,
    closed: AtomicBool,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            // Room for an overflow notice next to real events.
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: capacity.max(2),
            dropped: AtomicI64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue an event, dropping the oldest entries on overflow.
    #[allow(clippy::expect_used)]
    fn push(&self, subscriber_id: u64, event: EngineEvent) {
        let mut queue = self
            .queue
            .lock()
            .expect("subscriber queue lock should not be poisoned");

        if queue.len() + 1 > self.capacity {
            // Make room for the event plus a coalesced overflow notice.
            let mut dropped_now = 0;
            while queue.len() + 2 > self.capacity {
                queue.pop_front();
                dropped_now += 1;
            }
            let total = self.dropped.fetch_add(dropped_now, Ordering::SeqCst) + dropped_now;
            match queue.back_mut() {
                Some(EngineEvent::SubscriberOverflow { dropped, .. }) => *dropped = total,
                _ => queue.push_back(EngineEvent::SubscriberOverflow {
                    subscriber_id,
                    dropped: total,
                }),
            }
        }

        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }

    #[allow(clippy::expect_used)]
    fn pop(&self) -> Option<EngineEvent> {
        self.queue
            .lock()
            .expect("subscriber queue lock should not be poisoned")
            .pop_front()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}

struct SubscriberEntry {
    filter: EventFilter,
    queue: Arc<SubscriberQueue>,
}

struct BusInner {
    subscribers: Mutex<HashMap<u64, SubscriberEntry>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Drop for BusInner {
    fn drop(&mut self) {
        if let Ok(subscribers) = self.subscribers.lock() {
            for entry in subscribers.values() {
                entry.queue.close();
            }
        }
    }
}

/// The event hub. Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus with the default queue capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a bus with a custom per-subscriber queue capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                capacity,
            }),
        }
    }

    /// Subscribe with a filter. Dropping the subscription unsubscribes.
    #[allow(clippy::expect_used)]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let queue = Arc::new(SubscriberQueue::new(self.inner.capacity));
        self.inner
            .subscribers
            .lock()
            .expect("bus registry lock should not be poisoned")
            .insert(
                id,
                SubscriberEntry {
                    filter,
                    queue: queue.clone(),
                },
            );
        trace!(subscriber_id = id, "Bus subscriber added");
        Subscription {
            id,
            queue,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Publish an event to every matching subscriber. Never blocks.
    #[allow(clippy::expect_used)]
    pub fn publish(&self, event: EngineEvent) {
        let subscribers = self
            .inner
            .subscribers
            .lock()
            .expect("bus registry lock should not be poisoned");
        for (id, entry) in subscribers.iter() {
            if entry.filter.matches(&event) {
                entry.queue.push(*id, event.clone());
            }
        }
    }

    /// Number of active subscribers.
    #[allow(clippy::expect_used)]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .expect("bus registry lock should not be poisoned")
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// A live subscription. Receive with [`recv`](Self::recv); drop to
/// unsubscribe.
pub struct Subscription {
    id: u64,
    queue: Arc<SubscriberQueue>,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// The subscriber id (as it appears in overflow notices).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next event, in publication order.
    ///
    /// Returns `None` once the bus is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            // Arm the waiter before checking, so a push between the check
            // and the await still wakes us.
            let notified = self.queue.notify.notified();

            if let Some(event) = self.queue.pop() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::SeqCst) {
                return None;
            }
            notified.await;
        }
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.queue.pop()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            if let Ok(mut subscribers) = bus.subscribers.lock() {
                subscribers.remove(&self.id);
            }
        }
        trace!(subscriber_id = self.id, "Bus subscriber removed");
    }
}

#[cfg(test)]
#[path = "bus.test.rs"]
mod tests;
