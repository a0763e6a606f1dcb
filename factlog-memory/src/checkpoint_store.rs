//! Thread-safe in-memory checkpoint store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use factlog::checkpoint::CheckpointStore;
use factlog::errors::{CheckpointError, CheckpointResult};
use factlog::types::{GlobalPosition, ProjectionName};

/// In-memory checkpoint store, one monotonic position per projection name.
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<Mutex<HashMap<ProjectionName, GlobalPosition>>>,
}

impl Clone for InMemoryCheckpointStore {
    fn clone(&self) -> Self {
        Self {
            checkpoints: Arc::clone(&self.checkpoints),
        }
    }
}

impl InMemoryCheckpointStore {
    /// Creates a new empty checkpoint store.
    pub fn new() -> Self {
        Self {
            checkpoints: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, projection: &ProjectionName) -> CheckpointResult<Option<GlobalPosition>> {
        Ok(self.checkpoints.lock().get(projection).copied())
    }

    async fn save(
        &self,
        projection: &ProjectionName,
        position: GlobalPosition,
    ) -> CheckpointResult<()> {
        let mut checkpoints = self.checkpoints.lock();
        if let Some(&current) = checkpoints.get(projection) {
            if position < current {
                return Err(CheckpointError::Regressed {
                    projection: projection.clone(),
                    current,
                    attempted: position,
                });
            }
        }
        checkpoints.insert(projection.clone(), position);
        Ok(())
    }

    async fn delete(&self, projection: &ProjectionName) -> CheckpointResult<()> {
        self.checkpoints.lock().remove(projection);
        Ok(())
    }
}
