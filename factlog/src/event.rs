//! Event representations: domain payloads, causal metadata, and stored facts.
//!
//! A domain event is a closed enum implementing [`DomainEvent`]; the string
//! discriminator returned by [`DomainEvent::event_type`] is what subscription
//! filters and stored records carry. The payload itself is treated as an
//! opaque, serializable, immutable value; its schema belongs to the caller.

use std::collections::HashMap;

use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{EventId, EventVersion, GlobalPosition, StreamId, Timestamp};

/// Trait implemented by every domain event enum.
///
/// Implementations return a stable discriminator per variant, typically via
/// an exhaustive `match`. Exhaustiveness is the compile-time totality check:
/// adding a variant without handling it everywhere is a compile error, not a
/// runtime branch.
pub trait DomainEvent: Send + Sync {
    /// Returns the stable type name of this event.
    fn event_type(&self) -> &'static str;
}

/// A correlation identifier that links events belonging to one logical
/// workflow, even across commands.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
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
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Creates a new correlation ID.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

/// A causation identifier linking an event to the event that caused it.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
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
pub struct CausationId(Uuid);

impl From<EventId> for CausationId {
    /// The typical causation source: the id of the triggering event.
    fn from(event_id: EventId) -> Self {
        // EventId is guaranteed to be v7
        Self::try_new(*event_id.as_ref())
            .expect("EventId should always be a valid v7 UUID for CausationId")
    }
}

/// The user or system actor that initiated an event.
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
pub struct Actor(String);

/// Causal metadata attached to every stored event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Links events in the same logical workflow or session.
    pub correlation_id: Option<CorrelationId>,
    /// Links this event to the specific event that caused it.
    pub causation_id: Option<CausationId>,
    /// Identifies the user or system that initiated the event.
    pub actor: Option<Actor>,
    /// Additional custom metadata.
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

impl EventMetadata {
    /// Creates new empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the correlation ID.
    #[must_use]
    pub const fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Sets the causation ID.
    #[must_use]
    pub const fn with_causation_id(mut self, causation_id: CausationId) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    /// Sets the actor.
    #[must_use]
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Adds a custom metadata entry.
    #[must_use]
    pub fn with_custom(mut self, key: String, value: String) -> Self {
        self.custom.insert(key, value);
        self
    }
}

/// An event handed to the store for appending.
///
/// The store assigns the stream version, global position, and timestamp; the
/// caller supplies the id, payload, and metadata.
#[derive(Debug, Clone)]
pub struct NewEvent<E> {
    /// Unique identifier for this event (UUIDv7).
    pub event_id: EventId,
    /// The event payload.
    pub payload: E,
    /// Causal metadata.
    pub metadata: EventMetadata,
}

impl<E> NewEvent<E> {
    /// Creates a new event with a fresh id and empty metadata.
    pub fn new(payload: E) -> Self {
        Self {
            event_id: EventId::new(),
            payload,
            metadata: EventMetadata::new(),
        }
    }

    /// Creates a new event with the given metadata.
    pub fn with_metadata(payload: E, metadata: EventMetadata) -> Self {
        Self {
            event_id: EventId::new(),
            payload,
            metadata,
        }
    }
}

/// An event as it exists in the event store.
///
/// Once stored, an event is immutable and is never reordered relative to
/// other events in the same stream. `global_position` is the only
/// cross-stream order readers may rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent<E> {
    /// Unique identifier for this event.
    pub event_id: EventId,
    /// The stream this event belongs to.
    pub stream_id: StreamId,
    /// The stable type name of the payload, captured at append time.
    pub event_type: String,
    /// The position of this event within its stream.
    pub stream_version: EventVersion,
    /// The position of this event in the global order.
    pub global_position: GlobalPosition,
    /// When this event was stored.
    pub timestamp: Timestamp,
    /// The event payload.
    pub payload: E,
    /// Causal metadata.
    pub metadata: EventMetadata,
}
