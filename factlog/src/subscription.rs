//! Live event subscriptions.
//!
//! A subscription delivers newly appended events in global order from the
//! moment it is opened; it never replays history. Catch-up is composed by
//! the projection engine: `read_all` up to "now", then drain the live
//! channel, skipping anything already processed.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::event::StoredEvent;
use crate::types::StreamId;

/// Filter describing which events a subscriber wants delivered.
///
/// An empty filter matches everything. Stream and event-type restrictions
/// are AND'd together; within each restriction the listed values are OR'd.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    streams: Option<Vec<StreamId>>,
    event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// A filter matching every event.
    pub const fn all() -> Self {
        Self {
            streams: None,
            event_types: None,
        }
    }

    /// Restricts delivery to the given stream (additive).
    #[must_use]
    pub fn with_stream(mut self, stream_id: StreamId) -> Self {
        self.streams.get_or_insert_with(Vec::new).push(stream_id);
        self
    }

    /// Restricts delivery to the given event type (additive).
    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types
            .get_or_insert_with(Vec::new)
            .push(event_type.into());
        self
    }

    /// Whether a stored event passes this filter.
    pub fn matches<E>(&self, event: &StoredEvent<E>) -> bool {
        if let Some(streams) = &self.streams {
            if !streams.contains(&event.stream_id) {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.iter().any(|t| t == &event.event_type) {
                return false;
            }
        }
        true
    }
}

/// The receiving end of a live subscription.
///
/// Blocks the consumer loop in [`next`](Self::next) until a new event
/// arrives or the subscription is closed. Also implements
/// [`futures::Stream`].
#[derive(Debug)]
pub struct EventSubscription<E> {
    receiver: mpsc::UnboundedReceiver<StoredEvent<E>>,
}

impl<E> EventSubscription<E> {
    /// Waits for the next event; `None` means the store side was dropped.
    pub async fn next(&mut self) -> Option<StoredEvent<E>> {
        self.receiver.recv().await
    }

    /// Returns an already-delivered event without waiting, if any.
    pub fn try_next(&mut self) -> Option<StoredEvent<E>> {
        self.receiver.try_recv().ok()
    }
}

impl<E> Stream for EventSubscription<E> {
    type Item = StoredEvent<E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Fan-out registry used by store backends to publish appended events to
/// live subscribers.
///
/// Backends call [`publish`](Self::publish) while still holding their
/// append guard so delivery order matches global order. Closed subscribers
/// are pruned on the next publish.
#[derive(Debug)]
pub struct SubscriberRegistry<E> {
    senders: Mutex<Vec<(EventFilter, mpsc::UnboundedSender<StoredEvent<E>>)>>,
}

impl<E> Default for SubscriberRegistry<E> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> SubscriberRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber and returns its receiving end.
    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription<E> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders.lock().push((filter, sender));
        EventSubscription { receiver }
    }

    /// Delivers a freshly appended batch to every matching subscriber.
    pub fn publish(&self, events: &[StoredEvent<E>]) {
        let mut senders = self.senders.lock();
        senders.retain(|(filter, sender)| {
            for event in events {
                if filter.matches(event) && sender.send(event.clone()).is_err() {
                    return false;
                }
            }
            !sender.is_closed()
        });
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DomainEvent, EventMetadata};
    use crate::types::{EventId, EventVersion, GlobalPosition, Timestamp};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestEvent {
        Created,
        Renamed,
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                Self::Created => "Created",
                Self::Renamed => "Renamed",
            }
        }
    }

    fn stored(stream: &str, position: u64, payload: TestEvent) -> StoredEvent<TestEvent> {
        let event_type = payload.event_type().to_string();
        StoredEvent {
            event_id: EventId::new(),
            stream_id: StreamId::try_new(stream).unwrap(),
            event_type,
            stream_version: EventVersion::initial(),
            global_position: GlobalPosition::new(position),
            timestamp: Timestamp::now(),
            payload,
            metadata: EventMetadata::new(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = EventFilter::all();
        assert!(filter.matches(&stored("User-1", 1, TestEvent::Created)));
        assert!(filter.matches(&stored("Order-9", 2, TestEvent::Renamed)));
    }

    #[test]
    fn stream_filter_excludes_other_streams() {
        let filter = EventFilter::all().with_stream(StreamId::try_new("User-1").unwrap());
        assert!(filter.matches(&stored("User-1", 1, TestEvent::Created)));
        assert!(!filter.matches(&stored("User-2", 2, TestEvent::Created)));
    }

    #[test]
    fn event_type_filter_is_ored_within_and_anded_across() {
        let filter = EventFilter::all()
            .with_stream(StreamId::try_new("User-1").unwrap())
            .with_event_type("Created")
            .with_event_type("Renamed");
        assert!(filter.matches(&stored("User-1", 1, TestEvent::Created)));
        assert!(filter.matches(&stored("User-1", 2, TestEvent::Renamed)));
        assert!(!filter.matches(&stored("User-2", 3, TestEvent::Renamed)));
    }

    #[tokio::test]
    async fn registry_delivers_in_publish_order() {
        let registry = SubscriberRegistry::new();
        let mut subscription = registry.subscribe(EventFilter::all());

        registry.publish(&[
            stored("User-1", 1, TestEvent::Created),
            stored("User-1", 2, TestEvent::Renamed),
        ]);

        let first = subscription.next().await.unwrap();
        let second = subscription.next().await.unwrap();
        assert!(first.global_position < second.global_position);
    }

    #[tokio::test]
    async fn registry_applies_filters_per_subscriber() {
        let registry = SubscriberRegistry::new();
        let mut filtered = registry.subscribe(EventFilter::all().with_event_type("Renamed"));

        registry.publish(&[stored("User-1", 1, TestEvent::Created)]);
        registry.publish(&[stored("User-1", 2, TestEvent::Renamed)]);

        let delivered = filtered.next().await.unwrap();
        assert_eq!(delivered.event_type, "Renamed");
        assert!(filtered.try_next().is_none());
    }

    #[tokio::test]
    async fn registry_prunes_dropped_subscribers() {
        let registry = SubscriberRegistry::new();
        let subscription = registry.subscribe(EventFilter::all());
        assert_eq!(registry.subscriber_count(), 1);

        drop(subscription);
        registry.publish(&[stored("User-1", 1, TestEvent::Created)]);
        assert_eq!(registry.subscriber_count(), 0);
    }
}
