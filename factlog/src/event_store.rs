//! Event store abstraction: the port interface every backend implements.
//!
//! The trait is backend-independent; `factlog-memory` provides the reference
//! in-memory implementation. Durable backends implement the same contract
//! without changing any caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::EventStoreResult;
use crate::event::{DomainEvent, NewEvent, StoredEvent};
use crate::subscription::{EventFilter, EventSubscription};
use crate::types::{EventVersion, GlobalPosition, StreamId};

/// Expected stream version for optimistic concurrency control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// The stream must not exist yet.
    NoStream,
    /// The stream must exist and be exactly at this version.
    Exact(EventVersion),
    /// Any version is acceptable (no concurrency control).
    Any,
}

impl ExpectedVersion {
    /// Builds the expected version from a last-known version.
    ///
    /// `None` (never loaded any event) maps to [`ExpectedVersion::NoStream`].
    pub const fn from_last_known(version: Option<EventVersion>) -> Self {
        match version {
            None => Self::NoStream,
            Some(v) => Self::Exact(v),
        }
    }

    /// Whether this expectation is satisfied by the given current version.
    pub fn matches(self, current: Option<EventVersion>) -> bool {
        match self {
            Self::NoStream => current.is_none(),
            Self::Exact(expected) => current == Some(expected),
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoStream => write!(f, "no stream"),
            Self::Exact(version) => write!(f, "version {version}"),
            Self::Any => write!(f, "any version"),
        }
    }
}

/// Configuration for reading a single stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Return only events with a stream version greater than this
    /// (exclusive). `None` = from the beginning.
    pub after_version: Option<EventVersion>,
    /// Stop at this stream version (inclusive). `None` = to the end.
    pub to_version: Option<EventVersion>,
    /// Maximum number of events to return. `None` = no limit.
    pub max_events: Option<usize>,
}

impl ReadOptions {
    /// Creates read options covering the whole stream.
    pub const fn new() -> Self {
        Self {
            after_version: None,
            to_version: None,
            max_events: None,
        }
    }

    /// Returns only events strictly after the given version.
    #[must_use]
    pub const fn after_version(mut self, version: EventVersion) -> Self {
        self.after_version = Some(version);
        self
    }

    /// Stops at the given version (inclusive).
    #[must_use]
    pub const fn to_version(mut self, version: EventVersion) -> Self {
        self.to_version = Some(version);
        self
    }

    /// Limits the number of returned events.
    #[must_use]
    pub const fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = Some(max_events);
        self
    }

    /// Whether a stored event at `version` falls inside these options.
    pub fn includes(&self, version: EventVersion) -> bool {
        if let Some(after) = self.after_version {
            if version <= after {
                return false;
            }
        }
        if let Some(to) = self.to_version {
            if version > to {
                return false;
            }
        }
        true
    }
}

/// The core event store contract.
///
/// Implementations must guarantee:
///
/// - **Atomic batches**: `append` either stores every event in the batch or
///   none, and the batch becomes visible to readers at once.
/// - **Contiguous stream versions**: each appended event gets the next
///   stream version, starting at 0 for a new stream.
/// - **Strictly increasing global positions**: assigned at append time,
///   never reused, never reordered.
/// - **Conflict reporting**: a failed expectation yields
///   [`EventStoreError::VersionConflict`](crate::errors::EventStoreError)
///   carrying both the expected and the actual version, with the stream
///   left untouched.
/// - **Ordered live delivery**: subscribers receive newly appended events
///   in global order, with no coalescing and no historical replay (catch-up
///   is composed from `read_all` + `subscribe` by the caller).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// The event payload type this store handles.
    type Event: DomainEvent + Clone + Send + Sync + 'static;

    /// Appends a batch of events to one stream.
    ///
    /// Succeeds iff the stream's current version satisfies `expected`;
    /// returns the stream's new current version.
    async fn append(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        events: Vec<NewEvent<Self::Event>>,
    ) -> EventStoreResult<EventVersion>;

    /// Reads events from one stream, ordered by stream version.
    ///
    /// Restartable: identical arguments yield identical results absent new
    /// appends.
    async fn read_stream(
        &self,
        stream_id: &StreamId,
        options: &ReadOptions,
    ) -> EventStoreResult<Vec<StoredEvent<Self::Event>>>;

    /// Reads events across all streams in global order, strictly after
    /// `after`. Used by projections for catch-up.
    async fn read_all(
        &self,
        after: GlobalPosition,
        max_events: Option<usize>,
    ) -> EventStoreResult<Vec<StoredEvent<Self::Event>>>;

    /// Returns the current version of a stream, or `None` if the stream was
    /// never written.
    async fn stream_version(&self, stream_id: &StreamId)
        -> EventStoreResult<Option<EventVersion>>;

    /// Opens a live subscription to newly appended events matching `filter`,
    /// starting from the moment of subscription.
    async fn subscribe(
        &self,
        filter: EventFilter,
    ) -> EventStoreResult<EventSubscription<Self::Event>>;
}
