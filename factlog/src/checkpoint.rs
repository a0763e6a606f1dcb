//! Checkpoint persistence for projections.
//!
//! A checkpoint maps a projection name to the last global position it fully
//! processed, stored independently of the projection's read model so resume
//! point and state can be persisted and restored separately. Resuming from
//! a checkpoint gives at-least-once delivery: the window between the last
//! checkpoint and a crash is reprocessed on restart.

use async_trait::async_trait;

use crate::errors::CheckpointResult;
use crate::types::{GlobalPosition, ProjectionName};

/// Durable resume positions, keyed by projection name.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Loads the last saved position for a projection, or `None` if it has
    /// never checkpointed.
    async fn load(&self, projection: &ProjectionName) -> CheckpointResult<Option<GlobalPosition>>;

    /// Saves a position, replacing the previous one.
    ///
    /// # Errors
    ///
    /// Implementations must reject saves that would move a checkpoint
    /// backwards with [`CheckpointError::Regressed`](crate::errors::CheckpointError).
    async fn save(
        &self,
        projection: &ProjectionName,
        position: GlobalPosition,
    ) -> CheckpointResult<()>;

    /// Deletes the checkpoint for a projection. Used when rebuilding from
    /// scratch.
    async fn delete(&self, projection: &ProjectionName) -> CheckpointResult<()>;
}
