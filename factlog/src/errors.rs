//! Error types for the `factlog` engine.
//!
//! The taxonomy follows the subsystem boundaries: storage failures
//! (`EventStoreError`), command-cycle failures (`CommandError`), and the two
//! optimization paths (`SnapshotError`, `CheckpointError`) whose failures
//! must never break the correctness path. `ProjectionError` covers the read
//! side.
//!
//! `VersionConflict` / `ConcurrencyConflict` are the only expected,
//! recoverable failures: callers reload and retry (or abort). Everything
//! else is infrastructure trouble or a configuration bug and is never
//! silently retried by the engine itself.

use thiserror::Error;
use uuid::Uuid;

use crate::event_store::ExpectedVersion;
use crate::types::{EventVersion, GlobalPosition, ProjectionName, StreamId};

/// Result type for event store operations.
pub type EventStoreResult<T> = Result<T, EventStoreError>;

/// Result type for the command-decision cycle.
pub type CommandResult<T> = Result<T, CommandError>;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Result type for checkpoint operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Result type for projection operations.
pub type ProjectionResult<T> = Result<T, ProjectionError>;

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The requested stream was not found.
    #[error("stream '{0}' not found")]
    StreamNotFound(StreamId),

    /// Optimistic concurrency control rejected the append.
    ///
    /// This is the only expected, recoverable storage failure. It reports
    /// both sides of the comparison so the caller can decide whether to
    /// reload-and-retry or abort. The stream is unchanged.
    #[error(
        "version conflict on stream '{stream}': expected {expected}, actual {}",
        actual.map_or_else(|| "no stream".to_string(), |v| format!("version {v}"))
    )]
    VersionConflict {
        /// The stream with the version conflict.
        stream: StreamId,
        /// The version the writer expected.
        expected: ExpectedVersion,
        /// The actual current version (`None` = stream never written).
        actual: Option<EventVersion>,
    },

    /// An append was attempted with an empty event batch.
    #[error("empty append batch for stream '{0}'")]
    EmptyAppend(StreamId),

    /// The connection to the backing store failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Serialization of an event failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors that can occur during the command-decision cycle.
///
/// `ValidationFailed` and `BusinessRuleViolation` mean the command was
/// rejected: no events were produced and the aggregate is unchanged.
/// `ConcurrencyConflict` means someone else appended first; the caller
/// owns the retry policy.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command input failed validation.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A business rule was violated; the command produced no events.
    #[error("business rule violation: {0}")]
    BusinessRuleViolation(String),

    /// The aggregate does not exist (stream never written).
    #[error("{aggregate_type} aggregate {id} not found")]
    AggregateNotFound {
        /// The aggregate type name.
        aggregate_type: String,
        /// The aggregate identifier.
        id: Uuid,
    },

    /// Another writer appended to the aggregate's stream first.
    #[error(
        "concurrency conflict on stream '{stream}': expected {expected}, actual {}",
        actual.map_or_else(|| "no stream".to_string(), |v| format!("version {v}"))
    )]
    ConcurrencyConflict {
        /// The stream with the conflict.
        stream: StreamId,
        /// The version the save expected.
        expected: ExpectedVersion,
        /// The actual current version.
        actual: Option<EventVersion>,
    },

    /// An event store failure outside the concurrency path.
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),
}

/// Errors on the snapshot optimization path.
///
/// A snapshot failure must never break aggregate loading: callers degrade
/// to full replay.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot backing store failed.
    #[error("snapshot storage failed: {0}")]
    Storage(String),

    /// Snapshot state could not be serialized or deserialized.
    #[error("snapshot serialization failed: {0}")]
    Serialization(String),
}

/// Errors on the checkpoint optimization path.
///
/// A checkpoint failure degrades to reprocessing from the last successful
/// checkpoint; it never loses read-model correctness.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The checkpoint backing store failed.
    #[error("checkpoint storage failed: {0}")]
    Storage(String),

    /// A save would have moved a checkpoint backwards.
    ///
    /// Checkpoints are monotonically non-decreasing; attempting to regress
    /// one indicates a bug in the caller, not in the store.
    #[error(
        "checkpoint for projection '{projection}' would regress from {current} to {attempted}"
    )]
    Regressed {
        /// The projection whose checkpoint was being saved.
        projection: ProjectionName,
        /// The currently stored position.
        current: GlobalPosition,
        /// The position the save attempted to write.
        attempted: GlobalPosition,
    },
}

/// Errors in the projection system.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The event store failed while feeding the projection.
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Checkpoint persistence failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A projection handler rejected an event.
    ///
    /// Returned by [`Projection::apply`](crate::projection::Projection);
    /// the engine wraps it in [`ProjectionError::HandlerFailed`] with the
    /// offending position before faulting the projection.
    #[error("handler error: {0}")]
    Handler(String),

    /// A handler error stopped the projection.
    ///
    /// An unhandled failure in a projection handler is a configuration bug:
    /// the projection faults and stops, the event store is unaffected, and
    /// the position is reported for replay diagnosis.
    #[error("projection '{projection}' faulted at position {position}: {message}")]
    HandlerFailed {
        /// The faulted projection.
        projection: ProjectionName,
        /// The global position of the offending event.
        position: GlobalPosition,
        /// The underlying handler error.
        message: String,
    },

    /// The projection engine is already running.
    #[error("projection '{0}' is already running")]
    AlreadyRunning(ProjectionName),
}

impl ProjectionError {
    /// Creates a handler error from any displayable cause.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_reports_both_sides() {
        let err = EventStoreError::VersionConflict {
            stream: StreamId::try_new("User-1").unwrap(),
            expected: ExpectedVersion::Exact(EventVersion::new(0)),
            actual: Some(EventVersion::new(1)),
        };
        let message = err.to_string();
        assert!(message.contains("User-1"));
        assert!(message.contains("version 0"));
        assert!(message.contains("version 1"));
    }

    #[test]
    fn version_conflict_against_missing_stream() {
        let err = EventStoreError::VersionConflict {
            stream: StreamId::try_new("User-1").unwrap(),
            expected: ExpectedVersion::Exact(EventVersion::new(3)),
            actual: None,
        };
        assert!(err.to_string().contains("no stream"));
    }

    #[test]
    fn command_error_wraps_store_error() {
        let err = CommandError::from(EventStoreError::ConnectionFailed("refused".to_string()));
        assert!(matches!(err, CommandError::EventStore(_)));
    }

    #[test]
    fn checkpoint_regression_names_projection() {
        let err = CheckpointError::Regressed {
            projection: ProjectionName::try_new("balances").unwrap(),
            current: GlobalPosition::new(10),
            attempted: GlobalPosition::new(4),
        };
        assert!(err.to_string().contains("balances"));
    }
}
