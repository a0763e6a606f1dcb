//! Repository: load/save for aggregates with optimistic concurrency.
//!
//! Composes the event store, an optional snapshot manager, and an optional
//! aggregate cache. Composition is explicit at construction time via the
//! builder; there is no dynamic wrapping. The repository never retries a
//! conflict itself; the command-handling layer owns retry policy.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::errors::{CommandError, CommandResult, EventStoreError};
use crate::event::{EventMetadata, NewEvent};
use crate::event_store::{EventStore, ReadOptions};
use crate::types::{EventVersion, StreamId};

/// A cached aggregate state at a known version.
///
/// The cache is strictly an optimization: entries are refreshed on load by
/// replaying any newer events, and a concurrency conflict on save
/// invalidates the entry rather than masking the conflict.
#[derive(Debug)]
struct CacheEntry<S> {
    version: EventVersion,
    state: S,
}

struct AggregateCache<A: Aggregate> {
    entries: RwLock<HashMap<Uuid, CacheEntry<A::State>>>,
}

impl<A: Aggregate> AggregateCache<A> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, id: Uuid) -> Option<(EventVersion, A::State)> {
        self.entries
            .read()
            .get(&id)
            .map(|entry| (entry.version, entry.state.clone()))
    }

    fn put(&self, id: Uuid, version: EventVersion, state: A::State) {
        self.entries
            .write()
            .insert(id, CacheEntry { version, state });
    }

    fn invalidate(&self, id: Uuid) {
        self.entries.write().remove(&id);
    }
}

/// Builder for [`Repository`], composing optional collaborators up front.
pub struct RepositoryBuilder<A, ES>
where
    A: Aggregate,
    ES: EventStore<Event = A::Event>,
{
    event_store: Arc<ES>,
    snapshots: Option<crate::snapshot::SnapshotManager<A, ES>>,
    cache_enabled: bool,
}

impl<A, ES> RepositoryBuilder<A, ES>
where
    A: Aggregate,
    ES: EventStore<Event = A::Event>,
{
    /// Attaches a snapshot manager for compacted loading.
    #[must_use]
    pub fn with_snapshots(mut self, manager: crate::snapshot::SnapshotManager<A, ES>) -> Self {
        self.snapshots = Some(manager);
        self
    }

    /// Enables the in-memory aggregate cache.
    #[must_use]
    pub const fn with_cache(mut self) -> Self {
        self.cache_enabled = true;
        self
    }

    /// Finalizes the composition.
    pub fn build(self) -> Repository<A, ES> {
        Repository {
            event_store: self.event_store,
            snapshots: self.snapshots,
            cache: self.cache_enabled.then(AggregateCache::new),
        }
    }
}

/// Load/save access to one aggregate type with optimistic concurrency
/// enforcement.
pub struct Repository<A, ES>
where
    A: Aggregate,
    ES: EventStore<Event = A::Event>,
{
    event_store: Arc<ES>,
    snapshots: Option<crate::snapshot::SnapshotManager<A, ES>>,
    cache: Option<AggregateCache<A>>,
}

impl<A, ES> Repository<A, ES>
where
    A: Aggregate,
    ES: EventStore<Event = A::Event>,
{
    /// Creates a plain repository over an event store.
    pub fn new(event_store: Arc<ES>) -> Self {
        Self::builder(event_store).build()
    }

    /// Starts building a repository with optional collaborators.
    pub fn builder(event_store: Arc<ES>) -> RepositoryBuilder<A, ES> {
        RepositoryBuilder {
            event_store,
            snapshots: None,
            cache_enabled: false,
        }
    }

    /// Loads an aggregate root, hydrating it from the fastest valid
    /// source: cache, snapshot + residual tail, or full replay.
    ///
    /// A root for a stream that was never written is returned Empty
    /// (`version() == None`); use [`load_existing`](Self::load_existing)
    /// to treat that as an error.
    #[instrument(skip(self), fields(aggregate_type = A::aggregate_type()))]
    pub async fn load(&self, id: Uuid) -> CommandResult<AggregateRoot<A>> {
        let stream_id = StreamId::for_aggregate(A::aggregate_type(), id);

        if let Some(root) = self.load_from_cache(id, &stream_id).await? {
            return Ok(root);
        }

        if let Some(manager) = &self.snapshots {
            if let Some((snapshot, tail)) = manager.load(&stream_id).await? {
                let mut root = AggregateRoot::<A>::from_snapshot(id, snapshot.state, snapshot.version);
                root.hydrate(&tail);
                debug!(%stream_id, tail_len = tail.len(), "loaded from snapshot");
                self.refresh_cache(&root);
                return Ok(root);
            }
        }

        let events = self
            .event_store
            .read_stream(&stream_id, &ReadOptions::new())
            .await?;
        let mut root = AggregateRoot::<A>::new(id);
        root.hydrate(&events);
        self.refresh_cache(&root);
        Ok(root)
    }

    /// Loads an aggregate that must already exist.
    ///
    /// # Errors
    ///
    /// [`CommandError::AggregateNotFound`] when the stream was never
    /// written.
    pub async fn load_existing(&self, id: Uuid) -> CommandResult<AggregateRoot<A>> {
        let root = self.load(id).await?;
        if root.is_hydrated() {
            Ok(root)
        } else {
            Err(CommandError::AggregateNotFound {
                aggregate_type: A::aggregate_type().to_string(),
                id,
            })
        }
    }

    /// Persists the root's uncommitted events with its last-known version
    /// as the concurrency token. A no-op when nothing is buffered.
    ///
    /// On success the root transitions to Committed (buffer cleared,
    /// version advanced) and the snapshot manager is consulted. On a
    /// version conflict the cache entry is invalidated and
    /// [`CommandError::ConcurrencyConflict`] is surfaced unchanged.
    #[instrument(skip(self, root), fields(aggregate_type = A::aggregate_type(), id = %root.id()))]
    pub async fn save(&self, root: &mut AggregateRoot<A>) -> CommandResult<()> {
        self.save_with_metadata(root, EventMetadata::new()).await
    }

    /// Like [`save`](Self::save), stamping every event in the batch with
    /// the given causal metadata.
    pub async fn save_with_metadata(
        &self,
        root: &mut AggregateRoot<A>,
        metadata: EventMetadata,
    ) -> CommandResult<()> {
        if root.uncommitted_events().is_empty() {
            return Ok(());
        }

        let stream_id = root.stream_id();
        let events: Vec<NewEvent<A::Event>> = root
            .uncommitted_events()
            .iter()
            .map(|payload| NewEvent::with_metadata(payload.clone(), metadata.clone()))
            .collect();

        match self
            .event_store
            .append(&stream_id, root.expected_version(), events)
            .await
        {
            Ok(new_version) => {
                root.mark_committed(new_version);
                self.refresh_cache(root);
                if let Some(manager) = &self.snapshots {
                    if let Some(state) = root.state() {
                        manager.maybe_snapshot(&stream_id, state, new_version).await;
                    }
                }
                Ok(())
            }
            Err(EventStoreError::VersionConflict {
                stream,
                expected,
                actual,
            }) => {
                if let Some(cache) = &self.cache {
                    cache.invalidate(root.id());
                }
                warn!(%stream, %expected, "concurrent append detected");
                Err(CommandError::ConcurrencyConflict {
                    stream,
                    expected,
                    actual,
                })
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn load_from_cache(
        &self,
        id: Uuid,
        stream_id: &StreamId,
    ) -> CommandResult<Option<AggregateRoot<A>>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let Some((version, state)) = cache.get(id) else {
            return Ok(None);
        };

        // Bring the cached copy up to date with anything appended since.
        let tail = self
            .event_store
            .read_stream(stream_id, &ReadOptions::new().after_version(version))
            .await?;
        let mut root = AggregateRoot::<A>::from_snapshot(id, state, version);
        root.hydrate(&tail);
        if !tail.is_empty() {
            self.refresh_cache(&root);
        }
        Ok(Some(root))
    }

    fn refresh_cache(&self, root: &AggregateRoot<A>) {
        let (Some(cache), Some(version), Some(state)) = (&self.cache, root.version(), root.state())
        else {
            return;
        };
        cache.put(root.id(), version, state.clone());
    }
}
