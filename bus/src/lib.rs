//! Prioritized, sequence-aware event bus
//!
//! Events are ordered by (priority, arrival) on a bounded min-heap and
//! delivered to every handler registered for their type, one handler at
//! a time in registration order. Sources that stamp their events with
//! sequence numbers get in-order delivery: ahead-of-sequence events are
//! buffered until the gap closes, behind-sequence events are dropped.
//! Per-type throttles and a full queue drop on publish; neither blocks
//! the publisher.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod metrics;
mod sequence;

use anyhow::Result;
use async_trait::async_trait;
use common::{BusMetricsSnapshot, Event, EventType};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{error, info, warn};

pub use metrics::BusMetrics;

use sequence::{Observation, SequenceTracker};

/// A consumer of events of a given type.
///
/// Handlers run to completion sequentially; a returned error is logged
/// and does not affect the remaining handlers or the dispatch loop.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one event.
    async fn handle(&self, event: &Event) -> Result<()>;

    /// Handler name, used in logs and for removal.
    fn name(&self) -> &str;
}

/// Queue entry. Ordering is (priority, arrival): lower priority first,
/// FIFO within a priority level.
struct QueuedEvent {
    priority: u8,
    arrival: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.arrival == other.arrival
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.priority, self.arrival).cmp(&(other.priority, other.arrival))
    }
}

/// Fixed one-second throttle window for one event type.
struct Throttle {
    limit: u32,
    window_start: Instant,
    count: u32,
}

/// The event bus.
pub struct EventBus {
    capacity: usize,
    queue: Mutex<BinaryHeap<Reverse<QueuedEvent>>>,
    arrivals: AtomicU64,
    notify: Notify,
    handlers: RwLock<FxHashMap<EventType, Vec<Arc<dyn EventHandler>>>>,
    throttles: Mutex<FxHashMap<EventType, Throttle>>,
    sequences: Mutex<SequenceTracker>,
    metrics: BusMetrics,
    running: AtomicBool,
}

impl EventBus {
    /// Create a bus with the given queue capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(BinaryHeap::new()),
            arrivals: AtomicU64::new(0),
            notify: Notify::new(),
            handlers: RwLock::new(FxHashMap::default()),
            throttles: Mutex::new(FxHashMap::default()),
            sequences: Mutex::new(SequenceTracker::default()),
            metrics: BusMetrics::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Enqueue an event.
    ///
    /// Returns `false` without enqueueing when the queue is at capacity
    /// or the event type's throttle window is exhausted; both outcomes
    /// increment the dropped counter. Never blocks.
    pub fn publish(&self, event: Event) -> bool {
        let event_type = event.event_type();

        if !self.throttle_allows(event_type) {
            self.metrics.record_dropped();
            warn!(?event_type, "event throttled, dropping");
            return false;
        }

        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                drop(queue);
                self.metrics.record_dropped();
                warn!(?event_type, "event queue full, dropping");
                return false;
            }
            let arrival = self.arrivals.fetch_add(1, AtomicOrdering::Relaxed);
            queue.push(Reverse(QueuedEvent { priority: event.priority, arrival, event }));
        }

        self.notify.notify_one();
        true
    }

    /// Register a handler for an event type. Handlers run in
    /// registration order.
    pub fn add_handler(&self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        self.handlers.write().entry(event_type).or_default().push(handler);
    }

    /// Remove the first handler with the given name from an event type.
    /// Returns whether a handler was removed.
    pub fn remove_handler(&self, event_type: EventType, name: &str) -> bool {
        let mut handlers = self.handlers.write();
        let Some(registered) = handlers.get_mut(&event_type) else {
            return false;
        };
        let Some(index) = registered.iter().position(|h| h.name() == name) else {
            return false;
        };
        registered.remove(index);
        true
    }

    /// Limit an event type to `events_per_second` enqueues per
    /// one-second window. Excess events are dropped, not buffered.
    pub fn set_throttle(&self, event_type: EventType, events_per_second: u32) {
        self.throttles.lock().insert(
            event_type,
            Throttle { limit: events_per_second, window_start: Instant::now(), count: 0 },
        );
    }

    /// Run the dispatch loop until [`stop`](Self::stop) is called. The
    /// event being dispatched when `stop` arrives completes first.
    pub async fn run(&self) {
        self.running.store(true, AtomicOrdering::Release);
        info!("event bus started");
        while let Some(event) = self.next_event().await {
            for deliverable in self.reorder(event) {
                self.dispatch(&deliverable).await;
            }
        }
        info!("event bus stopped");
    }

    /// Ask the dispatch loop to exit after the current event.
    pub fn stop(&self) {
        self.running.store(false, AtomicOrdering::Release);
        self.notify.notify_one();
    }

    /// Whether the dispatch loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(AtomicOrdering::Acquire)
    }

    /// Events currently queued.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    /// Snapshot of bus metrics.
    #[must_use]
    pub fn metrics(&self) -> BusMetricsSnapshot {
        self.metrics.snapshot(self.queue_depth())
    }

    fn throttle_allows(&self, event_type: EventType) -> bool {
        let mut throttles = self.throttles.lock();
        let Some(throttle) = throttles.get_mut(&event_type) else {
            return true;
        };
        let now = Instant::now();
        if now.duration_since(throttle.window_start) >= Duration::from_secs(1) {
            throttle.window_start = now;
            throttle.count = 0;
        }
        if throttle.count >= throttle.limit {
            return false;
        }
        throttle.count += 1;
        true
    }

    async fn next_event(&self) -> Option<Event> {
        loop {
            if !self.running.load(AtomicOrdering::Acquire) {
                return None;
            }
            if let Some(Reverse(entry)) = self.queue.lock().pop() {
                return Some(entry.event);
            }
            self.notify.notified().await;
        }
    }

    /// Apply per-source sequence ordering to a dequeued event. Returns
    /// the events now deliverable, in sequence order.
    fn reorder(&self, event: Event) -> Vec<Event> {
        let mut sequences = self.sequences.lock();
        match sequences.observe(event) {
            Observation::Deliver(events) => events,
            Observation::Buffered => Vec::new(),
            Observation::Stale { source, sequence_id, expected } => {
                warn!(source, sequence_id, expected, "out-of-sequence event dropped");
                self.metrics.record_out_of_sequence();
                Vec::new()
            }
        }
    }

    async fn dispatch(&self, event: &Event) {
        let event_type = event.event_type();
        let handlers = self.handlers.read().get(&event_type).cloned().unwrap_or_default();
        if handlers.is_empty() {
            return;
        }

        let started = Instant::now();
        for handler in &handlers {
            if let Err(error) = handler.handle(event).await {
                error!(handler = handler.name(), ?event_type, %error, "event handler failed");
            }
        }
        self.metrics.record_dispatch(event_type, started.elapsed());
    }
}
