//! Aggregate reconstruction and the command-decision cycle.
//!
//! An aggregate is a transient, rebuildable projection of one stream into
//! typed state. Rebuild-from-history is a left fold of a pure `apply`
//! function over the ordered event sequence; determinism is the core
//! invariant: same events in the same order always yield the same state.
//!
//! The lifecycle per load-decide-save cycle is Empty (no state) → Hydrated
//! (state built from replay) → Decided (uncommitted events buffered by a
//! successful command) → Committed (events persisted, buffer cleared). A
//! rejected command never moves past Hydrated.

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::CommandResult;
use crate::event::{DomainEvent, StoredEvent};
use crate::event_store::ExpectedVersion;
use crate::types::{EventVersion, StreamId};

/// Behavior of one aggregate type: a pure fold plus a pure decision
/// function.
///
/// `apply` must be total over the aggregate's closed event enum: handle
/// every variant with an exhaustive `match`, so an unhandled event type is
/// a compile error rather than a runtime branch. `decide` validates a
/// command against current state and returns the resulting events without
/// mutating anything; the caller folds them back through `apply`.
pub trait Aggregate: Send + Sync + 'static {
    /// The state reconstructed from the stream. `None` before the first
    /// event; serde bounds exist so snapshots can deep-copy it.
    type State: Clone + Serialize + DeserializeOwned + Send + Sync;

    /// The aggregate's closed event enum.
    type Event: DomainEvent + Clone + Send + Sync + 'static;

    /// The aggregate's command type.
    type Command;

    /// The stable aggregate type name, used as the stream-id prefix.
    fn aggregate_type() -> &'static str;

    /// Applies one event to the state. Pure: no I/O, no randomness, no
    /// clock reads. `state` is `None` exactly when this is the stream's
    /// first event.
    fn apply(state: Option<Self::State>, event: &Self::Event) -> Self::State;

    /// Validates a command against current state and produces the events
    /// it implies, or rejects it.
    ///
    /// # Errors
    ///
    /// [`CommandError::ValidationFailed`](crate::errors::CommandError::ValidationFailed) or
    /// [`CommandError::BusinessRuleViolation`](crate::errors::CommandError::BusinessRuleViolation)
    /// when the command is illegal;
    /// in that case no events are produced and the aggregate is unchanged.
    fn decide(
        state: Option<&Self::State>,
        command: Self::Command,
    ) -> CommandResult<Vec<Self::Event>>;
}

/// Folds an ordered event sequence into aggregate state from scratch.
///
/// This is exactly the replay the repository performs on load; it is
/// exposed so tests and snapshot verification can compare against it.
pub fn fold<'a, A: Aggregate>(
    events: impl IntoIterator<Item = &'a A::Event>,
) -> Option<A::State> {
    events
        .into_iter()
        .fold(None, |state, event| Some(A::apply(state, event)))
}

/// One in-memory instance of an aggregate: identity, replayed state, and
/// the buffer of decided-but-unpersisted events.
///
/// Roots are short-lived: constructed per command cycle and discarded after
/// the save completes. They are not shared state.
pub struct AggregateRoot<A: Aggregate> {
    id: Uuid,
    version: Option<EventVersion>,
    state: Option<A::State>,
    uncommitted: Vec<A::Event>,
}

// Hand-written so the bounds land on the associated types rather than on
// the (usually unit-struct) aggregate marker itself.
impl<A: Aggregate> std::fmt::Debug for AggregateRoot<A>
where
    A::State: std::fmt::Debug,
    A::Event: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRoot")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("state", &self.state)
            .field("uncommitted", &self.uncommitted)
            .finish()
    }
}

impl<A: Aggregate> Clone for AggregateRoot<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            version: self.version,
            state: self.state.clone(),
            uncommitted: self.uncommitted.clone(),
        }
    }
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Creates an empty root for an aggregate that may not exist yet.
    pub const fn new(id: Uuid) -> Self {
        Self {
            id,
            version: None,
            state: None,
            uncommitted: Vec::new(),
        }
    }

    /// Restores a root from a snapshot capture.
    pub const fn from_snapshot(id: Uuid, state: A::State, version: EventVersion) -> Self {
        Self {
            id,
            version: Some(version),
            state: Some(state),
            uncommitted: Vec::new(),
        }
    }

    /// The aggregate identifier.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The stream this aggregate is persisted in.
    pub fn stream_id(&self) -> StreamId {
        StreamId::for_aggregate(A::aggregate_type(), self.id)
    }

    /// The last persisted stream version this root has seen, or `None` if
    /// the stream has never been written.
    pub const fn version(&self) -> Option<EventVersion> {
        self.version
    }

    /// The expected version a save must use as its concurrency token.
    pub const fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion::from_last_known(self.version)
    }

    /// The current state, `None` before the first event.
    pub const fn state(&self) -> Option<&A::State> {
        self.state.as_ref()
    }

    /// Whether any persisted event has been applied.
    pub const fn is_hydrated(&self) -> bool {
        self.version.is_some()
    }

    /// Events decided but not yet persisted.
    pub fn uncommitted_events(&self) -> &[A::Event] {
        &self.uncommitted
    }

    /// Replays one persisted event, advancing state and version.
    pub fn apply_stored(&mut self, event: &StoredEvent<A::Event>) {
        self.state = Some(A::apply(self.state.take(), &event.payload));
        self.version = Some(event.stream_version);
    }

    /// Replays an ordered batch of persisted events.
    pub fn hydrate<'a>(&mut self, events: impl IntoIterator<Item = &'a StoredEvent<A::Event>>)
    where
        A::Event: 'a,
    {
        for event in events {
            self.apply_stored(event);
        }
    }

    /// Runs a command through `decide`, folding the resulting events into
    /// state and buffering them for the next save.
    ///
    /// The persisted version is *not* advanced here; it remains the
    /// concurrency token for the save.
    ///
    /// # Errors
    ///
    /// Propagates the rejection from [`Aggregate::decide`]; state and
    /// buffer are untouched in that case.
    pub fn execute(&mut self, command: A::Command) -> CommandResult<()> {
        let events = A::decide(self.state.as_ref(), command)?;
        for event in &events {
            self.state = Some(A::apply(self.state.take(), event));
        }
        self.uncommitted.extend(events);
        Ok(())
    }

    /// Marks the buffered events as persisted at `version`.
    ///
    /// Called by the repository after a successful append; the buffer is
    /// cleared and the version advances to the stream's new current
    /// version.
    pub fn mark_committed(&mut self, version: EventVersion) {
        self.uncommitted.clear();
        self.version = Some(version);
    }
}
