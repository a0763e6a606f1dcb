//! Failure-injecting store wrappers for exercising degradation paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use factlog::checkpoint::CheckpointStore;
use factlog::errors::{CheckpointError, CheckpointResult, SnapshotError, SnapshotResult};
use factlog::snapshot::{Snapshot, SnapshotStore};
use factlog::types::{GlobalPosition, ProjectionName, StreamId, Timestamp};
use factlog_memory::{InMemoryCheckpointStore, InMemorySnapshotStore};

/// Snapshot store that can be switched into a failing mode at runtime.
///
/// While failing, every operation returns a storage error; the underlying
/// data is untouched and becomes visible again once healed.
pub struct UnreliableSnapshotStore<S> {
    inner: InMemorySnapshotStore<S>,
    failing: Arc<AtomicBool>,
}

impl<S> UnreliableSnapshotStore<S> {
    /// Creates a healthy store.
    pub fn new() -> Self {
        Self {
            inner: InMemorySnapshotStore::new(),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Switches failure injection on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of streams with a stored snapshot.
    pub fn snapshot_count(&self) -> usize {
        self.inner.snapshot_count()
    }

    fn check(&self) -> SnapshotResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(SnapshotError::Storage("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl<S> Default for UnreliableSnapshotStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> SnapshotStore for UnreliableSnapshotStore<S>
where
    S: Clone + Send + Sync + 'static,
{
    type State = S;

    async fn load(&self, stream_id: &StreamId) -> SnapshotResult<Option<Snapshot<Self::State>>> {
        self.check()?;
        self.inner.load(stream_id).await
    }

    async fn save(&self, snapshot: Snapshot<Self::State>) -> SnapshotResult<()> {
        self.check()?;
        self.inner.save(snapshot).await
    }

    async fn delete(&self, stream_id: &StreamId) -> SnapshotResult<()> {
        self.check()?;
        self.inner.delete(stream_id).await
    }

    async fn cleanup(&self, older_than: Timestamp) -> SnapshotResult<usize> {
        self.check()?;
        self.inner.cleanup(older_than).await
    }
}

/// Checkpoint store that can be switched into a failing mode at runtime.
pub struct UnreliableCheckpointStore {
    inner: InMemoryCheckpointStore,
    failing: Arc<AtomicBool>,
}

impl UnreliableCheckpointStore {
    /// Creates a healthy store.
    pub fn new() -> Self {
        Self {
            inner: InMemoryCheckpointStore::new(),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Switches failure injection on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> CheckpointResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CheckpointError::Storage("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for UnreliableCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for UnreliableCheckpointStore {
    async fn load(&self, projection: &ProjectionName) -> CheckpointResult<Option<GlobalPosition>> {
        self.check()?;
        self.inner.load(projection).await
    }

    async fn save(
        &self,
        projection: &ProjectionName,
        position: GlobalPosition,
    ) -> CheckpointResult<()> {
        self.check()?;
        self.inner.save(projection, position).await
    }

    async fn delete(&self, projection: &ProjectionName) -> CheckpointResult<()> {
        self.check()?;
        self.inner.delete(projection).await
    }
}
