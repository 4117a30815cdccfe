//! Event fan-out over bounded per-subscriber channels.
//!
//! `publish` runs on the pipeline thread and must return quickly: each
//! interested subscriber gets the event pushed into its own bounded queue,
//! and when a queue is full the oldest buffered event for that subscriber
//! is dropped and counted. A slow consumer therefore loses its own oldest
//! events and never blocks the producer or other subscribers.
//!
//! Channels are single-producer/single-consumer: the pipeline pushes, the
//! subscription handle pulls. Unsubscription is safe concurrently with
//! publishing (the cancellation flag is checked before each delivery) and
//! closure is idempotent. Events enqueued before closure may still be
//! drained by the consumer.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::{Event, EventType, SubscriptionId};

struct Channel {
    queue: Mutex<VecDeque<Event>>,
    ready: Condvar,
    capacity: usize,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Channel {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, event: Event) {
        let Ok(mut queue) = self.queue.lock() else {
            return;
        };
        while queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(event);
        drop(queue);
        self.ready.notify_one();
    }

    fn close(&self) {
        // Idempotent: the first close wakes any blocked consumer.
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.ready.notify_all();
        }
    }
}

/// A consumer's registered interest in a subset of event types, backed by a
/// bounded delivery channel. Dropping the handle does not unsubscribe; call
/// `EventBus::unsubscribe`.
pub struct Subscription {
    id: SubscriptionId,
    consumer: String,
    types: HashSet<EventType>,
    channel: Arc<Channel>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// The event types this subscription asked for.
    pub fn event_types(&self) -> &HashSet<EventType> {
        &self.types
    }

    /// Events dropped from this subscriber's queue due to overflow.
    pub fn dropped_events(&self) -> u64 {
        self.channel.dropped.load(Ordering::Relaxed)
    }

    /// Non-blocking pull. `None` means no event is queued right now.
    pub fn try_recv(&self) -> Option<Event> {
        self.channel.queue.lock().ok()?.pop_front()
    }

    /// Pull the next event, waiting up to `timeout`. Returns `None` once
    /// the channel is closed and drained, or on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        let deadline = std::time::Instant::now() + timeout;
        let mut queue = self.channel.queue.lock().ok()?;
        loop {
            if let Some(event) = queue.pop_front() {
                return Some(event);
            }
            if self.channel.closed.load(Ordering::SeqCst) {
                return None;
            }
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, _timed_out) = self.channel.ready.wait_timeout(queue, remaining).ok()?;
            queue = guard;
        }
    }

    /// Drain events until the channel closes, blocking between events.
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        std::iter::from_fn(move || loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.channel.closed.load(Ordering::SeqCst) {
                // Late events may have raced the close flag.
                return self.try_recv();
            }
            match self.recv_timeout(Duration::from_millis(100)) {
                Some(event) => return Some(event),
                None => continue,
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        self.channel.closed.load(Ordering::SeqCst)
    }
}

struct Entry {
    id: SubscriptionId,
    types: HashSet<EventType>,
    channel: Arc<Channel>,
    consumer: String,
}

/// Subscription registry plus fan-out.
pub struct EventBus {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
    channel_capacity: usize,
}

impl EventBus {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Register a consumer's interest in `types`.
    pub fn subscribe(
        &self,
        consumer: &str,
        types: impl IntoIterator<Item = EventType>,
    ) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let types: HashSet<EventType> = types.into_iter().collect();
        let channel = Arc::new(Channel::new(self.channel_capacity));
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Entry {
                id,
                types: types.clone(),
                channel: channel.clone(),
                consumer: consumer.to_string(),
            });
        }
        log::debug!("subscribed {} as {}", consumer, id);
        Subscription {
            id,
            consumer: consumer.to_string(),
            types,
            channel,
        }
    }

    /// Cancel a subscription and close its channel. Idempotent; already
    /// enqueued events remain drainable by the consumer.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|e| e.id != subscription.id);
        }
        subscription.channel.close();
    }

    /// Deliver one event to every interested, still-active subscriber.
    /// Never blocks on a consumer.
    pub fn publish(&self, event: &Event) {
        let targets: Vec<Arc<Channel>> = match self.entries.lock() {
            Ok(entries) => entries
                .iter()
                .filter(|e| e.types.contains(&event.event_type))
                .filter(|e| !e.channel.closed.load(Ordering::SeqCst))
                .map(|e| e.channel.clone())
                .collect(),
            Err(_) => return,
        };
        for channel in targets {
            channel.push(event.clone());
        }
    }

    /// Close every channel and clear the registry. Used at session stop.
    pub fn close_all(&self) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        for entry in entries.drain(..) {
            entry.channel.close();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Total events dropped across active subscribers, for diagnostics.
    pub fn dropped_events(&self) -> u64 {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| e.channel.dropped.load(Ordering::Relaxed))
                    .sum()
            })
            .unwrap_or(0)
    }
}
