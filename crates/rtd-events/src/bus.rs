//! Broadcast event bus.
//!
//! A thin wrapper over `tokio::sync::broadcast` that publishes `Arc<E>` to
//! every current subscriber. Used internally to observe lifecycle
//! transitions (client registration, task delivery, shutdown) without
//! threading an explicit subscriber list through the dispatcher — the same
//! shape as `astrid-events::bus::EventBus`, generalized over the event type
//! so `rtd-dispatch` can publish its own [`crate::event::DispatchEvent`]
//! without this crate depending on it.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Default channel capacity for a bus with no explicit capacity given.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Broadcasts events of type `E` to all current subscribers.
#[derive(Debug)]
pub struct EventBus<E> {
    sender: broadcast::Sender<Arc<E>>,
    capacity: usize,
}

impl<E> EventBus<E> {
    /// Create a bus with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with an explicit channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish an event, returning the number of subscribers it reached.
    ///
    /// Zero receivers is not an error — most runs have no test subscriber
    /// attached and the event is simply dropped.
    pub fn publish(&self, event: E) -> usize
    where
        E: std::fmt::Debug,
    {
        let event = Arc::new(event);
        match self.sender.send(Arc::clone(&event)) {
            Ok(count) => {
                debug!(?event, receiver_count = count, "event published");
                count
            },
            Err(_) => {
                trace!(?event, "no subscribers for event");
                0
            },
        }
    }

    /// Subscribe to future events. Events published before this call are
    /// never delivered to the new receiver.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver<E> {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Current number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// The channel capacity this bus was created with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            capacity: self.capacity,
        }
    }
}

/// A subscription handle returned by [`EventBus::subscribe`].
pub struct EventReceiver<E> {
    receiver: broadcast::Receiver<Arc<E>>,
}

impl<E> EventReceiver<E> {
    /// Receive the next event, skipping over a lag gap if the receiver fell
    /// behind. Returns `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<Arc<E>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_with_no_subscribers_returns_zero() {
        let bus: EventBus<&'static str> = EventBus::new();
        assert_eq!(bus.publish("hello"), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus: EventBus<&'static str> = EventBus::new();
        let mut rx = bus.subscribe();
        assert_eq!(bus.publish("hello"), 1);
        assert_eq!(*rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus: EventBus<&'static str> = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.publish("hi"), 2);
        assert_eq!(*rx1.recv().await.unwrap(), "hi");
        assert_eq!(*rx2.recv().await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn subscriber_count_reflects_subscriptions() {
        let bus: EventBus<&'static str> = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
    }
}
