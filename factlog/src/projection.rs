//! Projection contracts: read models folded from the global event order.

use serde::{Deserialize, Serialize};

use crate::errors::ProjectionResult;
use crate::event::StoredEvent;
use crate::subscription::EventFilter;
use crate::types::{GlobalPosition, ProjectionName, Timestamp};

/// A read model derived from the event log.
///
/// `apply` folds one event into the accumulated state. Projections
/// subscribe selectively: events the projection does not care about are
/// simply ignored inside `apply` (or excluded up front via
/// [`filter`](Self::filter)); an unmatched event type is not an error.
///
/// Handlers must be deterministic and, because delivery is at-least-once
/// across restarts, idempotent per entity (last-write-wins is the usual
/// shape). A handler returning an error is a configuration bug: the engine
/// faults the projection and stops it.
pub trait Projection: Send + Sync + 'static {
    /// The event payload type this projection consumes.
    type Event: Send + Sync + 'static;

    /// The accumulated read-model state.
    type State: Clone + Send + Sync;

    /// The projection's unique name, used for checkpoint storage.
    fn name(&self) -> ProjectionName;

    /// The state a rebuild starts from.
    fn initial_state(&self) -> Self::State;

    /// Folds one event into the state.
    ///
    /// # Errors
    ///
    /// Returning an error faults the projection; the engine logs the
    /// offending global position and stops.
    fn apply(&self, state: &mut Self::State, event: &StoredEvent<Self::Event>)
        -> ProjectionResult<()>;

    /// Optional pre-filter applied before `apply` is called. Defaults to
    /// everything.
    fn filter(&self) -> EventFilter {
        EventFilter::all()
    }
}

/// The accumulated state of a running projection plus its progress
/// bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionState<S> {
    /// The read-model state.
    pub state: S,
    /// The last global position folded into the state. Monotonically
    /// non-decreasing; advances past skipped events too.
    pub position: GlobalPosition,
    /// When the state last changed, `None` before the first applied event.
    pub last_updated: Option<Timestamp>,
    /// How many events have been applied (skipped events not counted).
    pub event_count: u64,
}

impl<S> ProjectionState<S> {
    /// Creates the starting state for a projection.
    pub fn new(state: S) -> Self {
        Self {
            state,
            position: GlobalPosition::start(),
            last_updated: None,
            event_count: 0,
        }
    }
}

/// Lifecycle of a projection engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionStatus {
    /// Loading the checkpoint (or defaulting to the start position).
    Initializing,
    /// Bulk-replaying history via `read_all`.
    CatchingUp,
    /// Following the live subscription.
    Live,
    /// Resetting to initial state and replaying from the start.
    Rebuilding,
    /// Stopped cleanly (shutdown or closed subscription).
    Stopped,
    /// Stopped by a handler error; see the logged position.
    Faulted,
}
