//! Factlog is an event-sourcing persistence and read-model engine.
//!
//! State changes are captured as an append-only sequence of domain events.
//! Aggregates decide commands against state folded from their stream,
//! persist through a [`Repository`] with optimistic concurrency, and read
//! models are derived by a [`ProjectionEngine`] that catches up over the
//! global event order and then follows a live subscription, resumable
//! through checkpoints.
//!
//! # Core pieces
//!
//! - [`EventStore`]: append-only streams with per-stream versioning and a
//!   store-assigned total order ([`GlobalPosition`]) across all streams.
//! - [`Aggregate`] + [`AggregateRoot`]: the decide/apply command cycle over
//!   replayed state.
//! - [`Repository`]: load and save with [`ExpectedVersion`] enforcement,
//!   optionally accelerated by snapshots and an in-memory cache.
//! - [`SnapshotManager`]: strategy-driven state compaction so long streams
//!   load without full replay.
//! - [`ProjectionEngine`]: checkpointed catch-up plus live subscription,
//!   with rebuild as the recovery path.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(InMemoryEventStore::new());
//! let repo: Repository<Account, _> = Repository::new(Arc::clone(&store));
//!
//! let mut account = repo.load(account_id).await?;
//! account.execute(AccountCommand::Deposit { amount: 100 })?;
//! repo.save(&mut account).await?;
//! ```
//!
//! Storage backends implement the [`EventStore`], `SnapshotStore`, and
//! [`CheckpointStore`] traits; the `factlog-memory` crate provides
//! in-memory implementations for testing and prototyping.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregate;
pub mod checkpoint;
pub mod engine;
pub mod errors;
pub mod event;
pub mod event_store;
pub mod projection;
pub mod repository;
pub mod snapshot;
pub mod subscription;
pub mod types;

pub use aggregate::{fold, Aggregate, AggregateRoot};
pub use checkpoint::CheckpointStore;
pub use engine::{ProjectionConfig, ProjectionEngine, ProjectionHandle};
pub use errors::{
    CheckpointError, CheckpointResult, CommandError, CommandResult, EventStoreError,
    EventStoreResult, ProjectionError, ProjectionResult, SnapshotError, SnapshotResult,
};
pub use event::{Actor, CausationId, CorrelationId, DomainEvent, EventMetadata, NewEvent, StoredEvent};
pub use event_store::{EventStore, ExpectedVersion, ReadOptions};
pub use projection::{Projection, ProjectionState, ProjectionStatus};
pub use repository::{Repository, RepositoryBuilder};
pub use snapshot::{
    EventCountStrategy, Snapshot, SnapshotDecision, SnapshotManager, SnapshotStore,
    SnapshotStrategy, StateSizeStrategy, TimeIntervalStrategy,
};
pub use subscription::{EventFilter, EventSubscription, SubscriberRegistry};
pub use types::{EventId, EventVersion, GlobalPosition, ProjectionName, StreamId, Timestamp};
