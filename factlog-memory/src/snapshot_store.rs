//! Thread-safe in-memory snapshot store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use factlog::errors::SnapshotResult;
use factlog::snapshot::{Snapshot, SnapshotStore};
use factlog::types::{StreamId, Timestamp};

/// In-memory snapshot store keeping the latest snapshot per stream.
///
/// Saving replaces any previous snapshot for the stream; there is no
/// history of captures.
pub struct InMemorySnapshotStore<S> {
    snapshots: Arc<Mutex<HashMap<StreamId, Snapshot<S>>>>,
}

impl<S> Clone for InMemorySnapshotStore<S> {
    fn clone(&self) -> Self {
        Self {
            snapshots: Arc::clone(&self.snapshots),
        }
    }
}

impl<S> InMemorySnapshotStore<S> {
    /// Creates a new empty snapshot store.
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of streams with a stored snapshot.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().len()
    }
}

impl<S> Default for InMemorySnapshotStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> SnapshotStore for InMemorySnapshotStore<S>
where
    S: Clone + Send + Sync + 'static,
{
    type State = S;

    async fn load(&self, stream_id: &StreamId) -> SnapshotResult<Option<Snapshot<Self::State>>> {
        Ok(self.snapshots.lock().get(stream_id).cloned())
    }

    async fn save(&self, snapshot: Snapshot<Self::State>) -> SnapshotResult<()> {
        self.snapshots
            .lock()
            .insert(snapshot.stream_id.clone(), snapshot);
        Ok(())
    }

    async fn delete(&self, stream_id: &StreamId) -> SnapshotResult<()> {
        self.snapshots.lock().remove(stream_id);
        Ok(())
    }

    async fn cleanup(&self, older_than: Timestamp) -> SnapshotResult<usize> {
        let mut snapshots = self.snapshots.lock();
        let before = snapshots.len();
        snapshots.retain(|_, snapshot| snapshot.taken_at >= older_than);
        Ok(before - snapshots.len())
    }
}
