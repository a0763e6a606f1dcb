//! Thread-safe in-memory event store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use factlog::errors::{EventStoreError, EventStoreResult};
use factlog::event::{DomainEvent, NewEvent, StoredEvent};
use factlog::event_store::{EventStore, ExpectedVersion, ReadOptions};
use factlog::subscription::{EventFilter, EventSubscription, SubscriberRegistry};
use factlog::types::{EventVersion, GlobalPosition, StreamId, Timestamp};

/// A single global log plus per-stream indices into it.
///
/// Everything mutated by an append lives behind one mutex so the batch is
/// atomic, global positions are assigned gap-free, and live delivery
/// (published while the guard is held) matches global order.
struct Log<E> {
    events: Vec<StoredEvent<E>>,
    streams: HashMap<StreamId, Vec<usize>>,
    head: GlobalPosition,
}

impl<E> Log<E> {
    fn current_version(&self, stream_id: &StreamId) -> Option<EventVersion> {
        self.streams.get(stream_id).and_then(|indices| {
            let count = u64::try_from(indices.len()).ok()?;
            count.checked_sub(1).map(EventVersion::new)
        })
    }
}

struct Inner<E> {
    log: Mutex<Log<E>>,
    subscribers: SubscriberRegistry<E>,
}

/// Thread-safe in-memory event store for testing and development.
///
/// Cloning is cheap and clones share the same log.
pub struct InMemoryEventStore<E>
where
    E: DomainEvent + Clone + Send + Sync + 'static,
{
    inner: Arc<Inner<E>>,
}

impl<E> Clone for InMemoryEventStore<E>
where
    E: DomainEvent + Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> InMemoryEventStore<E>
where
    E: DomainEvent + Clone + Send + Sync + 'static,
{
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                log: Mutex::new(Log {
                    events: Vec::new(),
                    streams: HashMap::new(),
                    head: GlobalPosition::start(),
                }),
                subscribers: SubscriberRegistry::new(),
            }),
        }
    }

    /// Total number of stored events.
    pub fn event_count(&self) -> usize {
        self.inner.log.lock().events.len()
    }

    /// The global position of the most recently stored event
    /// ([`GlobalPosition::start`] when empty).
    pub fn head_position(&self) -> GlobalPosition {
        self.inner.log.lock().head
    }
}

impl<E> Default for InMemoryEventStore<E>
where
    E: DomainEvent + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E> EventStore for InMemoryEventStore<E>
where
    E: DomainEvent + Clone + Send + Sync + 'static,
{
    type Event = E;

    async fn append(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        events: Vec<NewEvent<Self::Event>>,
    ) -> EventStoreResult<EventVersion> {
        if events.is_empty() {
            return Err(EventStoreError::EmptyAppend(stream_id.clone()));
        }

        let mut log = self.inner.log.lock();

        let mut current = log.current_version(stream_id);
        if !expected.matches(current) {
            return Err(EventStoreError::VersionConflict {
                stream: stream_id.clone(),
                expected,
                actual: current,
            });
        }

        let mut appended = Vec::with_capacity(events.len());
        for event in events {
            let stream_version = current.map_or_else(EventVersion::initial, EventVersion::next);
            log.head = log.head.next();
            appended.push(StoredEvent {
                event_id: event.event_id,
                stream_id: stream_id.clone(),
                event_type: event.payload.event_type().to_string(),
                stream_version,
                global_position: log.head,
                timestamp: Timestamp::now(),
                payload: event.payload,
                metadata: event.metadata,
            });
            current = Some(stream_version);
        }

        let base = log.events.len();
        log.streams
            .entry(stream_id.clone())
            .or_default()
            .extend(base..base + appended.len());
        log.events.extend(appended.iter().cloned());

        debug!(%stream_id, count = appended.len(), head = %log.head, "appended batch");

        // Published under the log guard so subscribers observe global order.
        self.inner.subscribers.publish(&appended);

        current.ok_or_else(|| {
            EventStoreError::Internal("append produced no stream version".to_string())
        })
    }

    async fn read_stream(
        &self,
        stream_id: &StreamId,
        options: &ReadOptions,
    ) -> EventStoreResult<Vec<StoredEvent<Self::Event>>> {
        let log = self.inner.log.lock();
        let Some(indices) = log.streams.get(stream_id) else {
            return Ok(Vec::new());
        };

        let matching = indices
            .iter()
            .map(|&index| &log.events[index])
            .filter(|event| options.includes(event.stream_version));

        Ok(match options.max_events {
            Some(max) => matching.take(max).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    async fn read_all(
        &self,
        after: GlobalPosition,
        max_events: Option<usize>,
    ) -> EventStoreResult<Vec<StoredEvent<Self::Event>>> {
        let log = self.inner.log.lock();
        let matching = log
            .events
            .iter()
            .filter(|event| event.global_position > after);

        Ok(match max_events {
            Some(max) => matching.take(max).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    async fn stream_version(
        &self,
        stream_id: &StreamId,
    ) -> EventStoreResult<Option<EventVersion>> {
        Ok(self.inner.log.lock().current_version(stream_id))
    }

    async fn subscribe(
        &self,
        filter: EventFilter,
    ) -> EventStoreResult<EventSubscription<Self::Event>> {
        Ok(self.inner.subscribers.subscribe(filter))
    }
}
