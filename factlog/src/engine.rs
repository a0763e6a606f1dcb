//! The projection engine: checkpointed, resumable read-model derivation.
//!
//! Lifecycle: Initializing (load checkpoint or default to the start) →
//! CatchingUp (batched `read_all`) → Live (drain the subscription opened
//! *before* the final catch-up pass, skipping anything already processed),
//! with Rebuilding available on demand and Stopped/Faulted as terminal
//! states.
//!
//! Batching exists purely to amortize checkpoint writes; state updates are
//! per-event and strictly ordered. The checkpoint only ever advances after
//! the events up to that point were fully processed, so cancellation and
//! crashes degrade to at-least-once reprocessing, never to corruption.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::checkpoint::CheckpointStore;
use crate::errors::{ProjectionError, ProjectionResult};
use crate::event::StoredEvent;
use crate::event_store::EventStore;
use crate::projection::{Projection, ProjectionState, ProjectionStatus};
use crate::subscription::EventFilter;
use crate::types::{GlobalPosition, ProjectionName, Timestamp};

/// Tuning knobs for a projection engine.
#[derive(Debug, Clone)]
pub struct ProjectionConfig {
    /// How many events to read and process per catch-up batch, and how
    /// many live events to process between checkpoint writes.
    pub batch_size: usize,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

struct EngineShared<S> {
    state: RwLock<ProjectionState<S>>,
    status: RwLock<ProjectionStatus>,
    running: AtomicBool,
}

/// Drives one [`Projection`] over an event store: historical catch-up,
/// live subscription, checkpointing, and rebuild.
///
/// The engine is cheaply cloneable; clones share state, status, and
/// checkpoint progress.
pub struct ProjectionEngine<P, ES>
where
    P: Projection,
    ES: EventStore<Event = P::Event> + 'static,
{
    projection: Arc<P>,
    event_store: Arc<ES>,
    checkpoints: Arc<dyn CheckpointStore>,
    shared: Arc<EngineShared<P::State>>,
    filter: EventFilter,
    name: ProjectionName,
    config: ProjectionConfig,
}

impl<P, ES> Clone for ProjectionEngine<P, ES>
where
    P: Projection,
    ES: EventStore<Event = P::Event> + 'static,
{
    fn clone(&self) -> Self {
        Self {
            projection: Arc::clone(&self.projection),
            event_store: Arc::clone(&self.event_store),
            checkpoints: Arc::clone(&self.checkpoints),
            shared: Arc::clone(&self.shared),
            filter: self.filter.clone(),
            name: self.name.clone(),
            config: self.config.clone(),
        }
    }
}

impl<P, ES> ProjectionEngine<P, ES>
where
    P: Projection,
    ES: EventStore<Event = P::Event> + 'static,
{
    /// Creates an engine with the default configuration.
    pub fn new(projection: P, event_store: Arc<ES>, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self::with_config(projection, event_store, checkpoints, ProjectionConfig::default())
    }

    /// Creates an engine with explicit tuning.
    pub fn with_config(
        projection: P,
        event_store: Arc<ES>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: ProjectionConfig,
    ) -> Self {
        let initial = ProjectionState::new(projection.initial_state());
        let filter = projection.filter();
        let name = projection.name();
        Self {
            projection: Arc::new(projection),
            event_store,
            checkpoints,
            shared: Arc::new(EngineShared {
                state: RwLock::new(initial),
                status: RwLock::new(ProjectionStatus::Initializing),
                running: AtomicBool::new(false),
            }),
            filter,
            name,
            config,
        }
    }

    /// The projection's name.
    pub const fn name(&self) -> &ProjectionName {
        &self.name
    }

    /// A clone of the current read-model state.
    pub async fn state(&self) -> P::State {
        self.shared.state.read().await.state.clone()
    }

    /// The full projection state including progress bookkeeping.
    pub async fn projection_state(&self) -> ProjectionState<P::State> {
        self.shared.state.read().await.clone()
    }

    /// The last global position folded into the state.
    pub async fn position(&self) -> GlobalPosition {
        self.shared.state.read().await.position
    }

    /// The engine's current lifecycle status.
    pub async fn status(&self) -> ProjectionStatus {
        *self.shared.status.read().await
    }

    /// Loads the checkpoint and positions the engine behind it.
    ///
    /// A checkpoint-store failure is logged and degrades to resuming from
    /// the current (possibly start) position: reprocessing is safe,
    /// losing events is not.
    pub async fn initialize(&self) -> GlobalPosition {
        self.set_status(ProjectionStatus::Initializing).await;
        match self.checkpoints.load(&self.name).await {
            Ok(Some(position)) => {
                let mut state = self.shared.state.write().await;
                if position > state.position {
                    state.position = position;
                }
                debug!(projection = %self.name, %position, "resuming from checkpoint");
                state.position
            }
            Ok(None) => self.shared.state.read().await.position,
            Err(error) => {
                warn!(
                    projection = %self.name,
                    %error,
                    "checkpoint load failed, reprocessing from current position"
                );
                self.shared.state.read().await.position
            }
        }
    }

    /// Bulk-replays history from the current position until the log is
    /// exhausted, checkpointing after each fully processed batch. Returns
    /// the position reached.
    #[instrument(skip(self), fields(projection = %self.name))]
    pub async fn catch_up(&self) -> ProjectionResult<GlobalPosition> {
        self.set_status(ProjectionStatus::CatchingUp).await;
        loop {
            let position = self.position().await;
            let batch = self
                .event_store
                .read_all(position, Some(self.config.batch_size))
                .await?;
            if batch.is_empty() {
                break;
            }
            self.apply_batch(&batch).await?;
            self.save_checkpoint_lenient().await;
        }
        let reached = self.position().await;
        debug!(projection = %self.name, position = %reached, "catch-up complete");
        Ok(reached)
    }

    /// Persists the current position on demand.
    ///
    /// # Errors
    ///
    /// Propagates checkpoint-store failures; unlike the engine's internal
    /// amortized saves, an explicit checkpoint request reports them.
    pub async fn checkpoint(&self) -> ProjectionResult<GlobalPosition> {
        let position = self.position().await;
        self.checkpoints.save(&self.name, position).await?;
        Ok(position)
    }

    /// Resets the read model to its initial state and replays the whole
    /// log from the start. The authoritative recovery path after handler
    /// logic changes.
    #[instrument(skip(self), fields(projection = %self.name))]
    pub async fn rebuild(&self) -> ProjectionResult<GlobalPosition> {
        self.set_status(ProjectionStatus::Rebuilding).await;
        {
            let mut state = self.shared.state.write().await;
            *state = ProjectionState::new(self.projection.initial_state());
        }
        if let Err(error) = self.checkpoints.delete(&self.name).await {
            warn!(projection = %self.name, %error, "checkpoint delete failed during rebuild");
        }
        info!(projection = %self.name, "rebuilding from the start of the log");
        self.catch_up().await
    }

    /// Spawns the catch-up-then-live run loop and returns a handle for
    /// stopping it.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::AlreadyRunning`] if this engine (or a clone) is
    /// already running.
    pub fn start(&self) -> ProjectionResult<ProjectionHandle> {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Err(ProjectionError::AlreadyRunning(self.name.clone()));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let engine = self.clone();
        let task = tokio::spawn(async move {
            let result = engine.run(shutdown_rx).await;
            engine.shared.running.store(false, Ordering::Release);
            if let Err(error) = &result {
                error!(projection = %engine.name, %error, "projection run loop stopped with error");
            }
            result
        });

        Ok(ProjectionHandle {
            shutdown: shutdown_tx,
            task,
        })
    }

    /// The run loop: subscribe first, catch up, then go live.
    async fn run(&self, mut shutdown: oneshot::Receiver<()>) -> ProjectionResult<()> {
        // Opening the subscription before the final catch-up pass closes
        // the gap between "end of history" and "first live event"; any
        // overlap is dropped by the position check below.
        let mut subscription = self.event_store.subscribe(self.filter.clone()).await?;

        self.initialize().await;
        self.catch_up().await?;

        self.set_status(ProjectionStatus::Live).await;
        let position = self.position().await;
        info!(projection = %self.name, %position, "projection live");

        let mut since_checkpoint = 0usize;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    self.set_status(ProjectionStatus::Stopped).await;
                    self.save_checkpoint_lenient().await;
                    return Ok(());
                }
                delivery = subscription.next() => {
                    let Some(event) = delivery else {
                        self.set_status(ProjectionStatus::Stopped).await;
                        self.save_checkpoint_lenient().await;
                        return Ok(());
                    };
                    if event.global_position <= self.position().await {
                        // Already folded during catch-up.
                        continue;
                    }
                    self.apply_batch(std::slice::from_ref(&event)).await?;
                    since_checkpoint += 1;
                    if since_checkpoint >= self.config.batch_size {
                        self.save_checkpoint_lenient().await;
                        since_checkpoint = 0;
                    }
                }
            }
        }
    }

    /// Folds a batch into the state, strictly in order.
    ///
    /// The position advances past every event, including filtered-out
    /// ones; `event_count` counts only applied events. A handler error
    /// faults the projection without advancing past the offending event.
    async fn apply_batch(&self, events: &[StoredEvent<P::Event>]) -> ProjectionResult<()> {
        let mut state = self.shared.state.write().await;
        for event in events {
            if self.filter.matches(event) {
                if let Err(cause) = self.projection.apply(&mut state.state, event) {
                    drop(state);
                    self.set_status(ProjectionStatus::Faulted).await;
                    error!(
                        projection = %self.name,
                        position = %event.global_position,
                        %cause,
                        "projection handler failed; stopping projection"
                    );
                    return Err(ProjectionError::HandlerFailed {
                        projection: self.name.clone(),
                        position: event.global_position,
                        message: cause.to_string(),
                    });
                }
                state.event_count += 1;
                state.last_updated = Some(Timestamp::now());
            }
            state.position = event.global_position;
        }
        Ok(())
    }

    /// Amortized checkpoint write: failures degrade to reprocessing from
    /// the last successful checkpoint, so they are logged, not fatal.
    async fn save_checkpoint_lenient(&self) {
        let position = self.position().await;
        if let Err(error) = self.checkpoints.save(&self.name, position).await {
            warn!(projection = %self.name, %position, %error, "checkpoint save failed");
        }
    }

    async fn set_status(&self, status: ProjectionStatus) {
        *self.shared.status.write().await = status;
    }
}

/// Handle to a running projection engine.
#[derive(Debug)]
pub struct ProjectionHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<ProjectionResult<()>>,
}

impl ProjectionHandle {
    /// Signals shutdown and waits for the run loop to finish.
    ///
    /// # Errors
    ///
    /// Returns the run loop's error if it faulted before the stop.
    pub async fn stop(self) -> ProjectionResult<()> {
        let _ = self.shutdown.send(());
        self.task
            .await
            .unwrap_or_else(|join_error| {
                Err(ProjectionError::Handler(format!(
                    "projection task failed: {join_error}"
                )))
            })
    }

    /// Waits for the run loop to finish without signalling shutdown.
    /// Useful when the subscription is expected to close on its own.
    pub async fn join(self) -> ProjectionResult<()> {
        let Self { shutdown, task } = self;
        let result = task.await.unwrap_or_else(|join_error| {
            Err(ProjectionError::Handler(format!(
                "projection task failed: {join_error}"
            )))
        });
        // The sender is held until the task is done so waiting never reads
        // as a stop signal.
        drop(shutdown);
        result
    }
}
