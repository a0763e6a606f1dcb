//! Core identifier and position types for the `factlog` engine.
//!
//! All types use smart constructors to ensure validity at construction time,
//! following the "parse, don't validate" principle. Once a value exists it is
//! always valid and needs no further checking.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stream identifier that uniquely identifies an event stream.
///
/// `StreamId` values are guaranteed to be non-empty and at most 255 characters.
/// Streams are conventionally named `"<AggregateType>-<id>"`; see
/// [`StreamId::for_aggregate`].
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct StreamId(String);

impl StreamId {
    /// Derives the conventional stream id for an aggregate instance.
    ///
    /// The result is `"<aggregate_type>-<id>"`.
    pub fn for_aggregate(aggregate_type: &str, id: Uuid) -> Self {
        Self::try_new(format!("{aggregate_type}-{id}"))
            .expect("aggregate type must be a non-empty name")
    }
}

/// A globally unique event identifier using UUIDv7 format.
///
/// UUIDv7 gives time-based sort order for free, but within `factlog` the
/// authoritative cross-stream order is [`GlobalPosition`], assigned by the
/// event store at append time.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new `EventId` with the current timestamp.
    pub fn new() -> Self {
        // Uuid::now_v7() always returns a valid v7 UUID
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// The version of an event within its stream.
///
/// Versions start at 0 for the first event of a stream and increment by one
/// with each appended event. A stream that has never been written has no
/// version at all; that case is represented as `Option<EventVersion>::None`
/// (or [`ExpectedVersion::NoStream`](crate::event_store::ExpectedVersion) on
/// the write side), never as a negative sentinel.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct EventVersion(u64);

impl EventVersion {
    /// The version of the first event in a stream (0).
    pub fn initial() -> Self {
        Self::new(0)
    }

    /// Returns the next version after this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.into_inner() + 1)
    }

    /// Returns the number of events a stream at this version contains.
    ///
    /// Versions are 0-indexed, so a stream at version `v` holds `v + 1`
    /// events.
    pub fn event_count(self) -> u64 {
        self.into_inner() + 1
    }
}

/// A position in the global, cross-stream event order.
///
/// The event store assigns a strictly increasing `GlobalPosition` to every
/// appended event. The first stored event gets position 1;
/// [`GlobalPosition::start`] (0) is the exclusive "before the first event"
/// cursor origin used by `read_all` and projection checkpoints.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct GlobalPosition(u64);

impl GlobalPosition {
    /// The cursor origin: the position before any stored event.
    pub fn start() -> Self {
        Self::new(0)
    }

    /// Returns the next position after this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.into_inner() + 1)
    }
}

/// Name for a projection, used for checkpoint storage and identification.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ProjectionName(String);

/// A timestamp for when an event occurred or a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Converts the timestamp into the underlying `DateTime`.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
