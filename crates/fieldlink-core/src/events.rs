//! Timestamped event broadcast
//!
//! Both engines publish their status changes and samples on an [`EventBus`].
//! Subscribers receive clones of immutable [`Event`] records; dropping a
//! receiver is the only way to unsubscribe and never disturbs publishing.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default channel capacity for an event bus
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A timestamped, immutable event record
#[derive(Debug, Clone, Serialize)]
pub struct Event<T> {
    sequence: u64,
    timestamp: DateTime<Utc>,
    payload: T,
}

impl<T> Event<T> {
    /// Monotonic sequence number within the bus that produced this event
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// When the event was published
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The event payload
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consume the event and return its payload
    pub fn into_payload(self) -> T {
        self.payload
    }
}

/// Publish/subscribe channel for engine events
pub struct EventBus<T> {
    tx: broadcast::Sender<Event<T>>,
    sequence: AtomicU64,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish a payload to all current subscribers.
    ///
    /// Returns the number of subscribers that received the event. Having no
    /// subscribers is not an error.
    pub fn publish(&self, payload: T) -> usize {
        let event = Event {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            payload,
        };
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Event<T>> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
