//! Snapshots: policy-driven compaction of aggregate replay cost.
//!
//! A snapshot is purely an optimization over the event store. A missing,
//! stale, or failing snapshot must never break correctness: loading falls
//! back to full replay, which is always valid. The manager therefore
//! swallows snapshot-path errors with a warning instead of propagating
//! them.
//!
//! The store keeps exactly one snapshot per stream: the latest. Loading
//! always resumes from the most recent capture plus the residual event
//! tail with `stream_version > snapshot.version`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::Aggregate;
use crate::errors::{EventStoreResult, SnapshotError, SnapshotResult};
use crate::event::StoredEvent;
use crate::event_store::{EventStore, ReadOptions};
use crate::types::{EventVersion, StreamId, Timestamp};

/// A compacted capture of aggregate state at a specific stream version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    /// The stream this snapshot compacts.
    pub stream_id: StreamId,
    /// The stream version at capture time. Always ≤ the stream's current
    /// version; loading combines this with all later events.
    pub version: EventVersion,
    /// The captured state, isolated from the live aggregate.
    pub state: S,
    /// When the capture was taken.
    pub taken_at: Timestamp,
}

/// Keyed snapshot persistence, one latest snapshot per stream.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The aggregate state type this store holds.
    type State: Send + Sync;

    /// Loads the latest snapshot for a stream, if one exists.
    async fn load(&self, stream_id: &StreamId) -> SnapshotResult<Option<Snapshot<Self::State>>>;

    /// Stores a snapshot, replacing any previous one for the stream.
    async fn save(&self, snapshot: Snapshot<Self::State>) -> SnapshotResult<()>;

    /// Deletes the snapshot for a stream.
    async fn delete(&self, stream_id: &StreamId) -> SnapshotResult<()>;

    /// Purges snapshots taken before `older_than`, returning the number
    /// deleted. Bounded retention is deployment policy, not correctness.
    async fn cleanup(&self, older_than: Timestamp) -> SnapshotResult<usize>;
}

/// Inputs to a snapshot decision, evaluated after each successful save.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotDecision {
    /// The stream's current version.
    pub current_version: EventVersion,
    /// Events appended since the last snapshot (full history length if no
    /// snapshot exists yet).
    pub events_since_snapshot: u64,
    /// When the last snapshot was taken, if any.
    pub last_snapshot_at: Option<Timestamp>,
    /// The evaluation moment.
    pub now: Timestamp,
    /// Serialized state size in bytes; only computed when a registered
    /// strategy declares it needs it.
    pub state_size: Option<usize>,
}

/// One composable compaction trigger. Strategies registered on a manager
/// are OR'd: any one firing creates a snapshot.
pub trait SnapshotStrategy: Send + Sync {
    /// Whether a snapshot should be taken now.
    fn should_snapshot(&self, decision: &SnapshotDecision) -> bool;

    /// Whether this strategy needs `state_size` to be computed.
    fn needs_state_size(&self) -> bool {
        false
    }
}

/// Snapshot every `threshold` events. The mandatory baseline strategy.
#[derive(Debug, Clone, Copy)]
pub struct EventCountStrategy {
    threshold: u64,
}

impl EventCountStrategy {
    /// Default event-count threshold.
    pub const DEFAULT_THRESHOLD: u64 = 50;

    /// Creates a count strategy with the given threshold (minimum 1).
    pub const fn new(threshold: u64) -> Self {
        Self {
            threshold: if threshold == 0 { 1 } else { threshold },
        }
    }
}

impl Default for EventCountStrategy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl SnapshotStrategy for EventCountStrategy {
    fn should_snapshot(&self, decision: &SnapshotDecision) -> bool {
        decision.events_since_snapshot >= self.threshold
    }
}

/// Snapshot when the last capture is older than a fixed interval.
///
/// With no prior snapshot the strategy fires immediately; the event-count
/// baseline usually wins that race anyway.
#[derive(Debug, Clone, Copy)]
pub struct TimeIntervalStrategy {
    interval: Duration,
}

impl TimeIntervalStrategy {
    /// Creates a time strategy with the given interval.
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl SnapshotStrategy for TimeIntervalStrategy {
    fn should_snapshot(&self, decision: &SnapshotDecision) -> bool {
        decision.last_snapshot_at.map_or(true, |taken_at| {
            *decision.now.as_datetime() - *taken_at.as_datetime() >= self.interval
        })
    }
}

/// Snapshot when the serialized state grows past a byte threshold.
#[derive(Debug, Clone, Copy)]
pub struct StateSizeStrategy {
    max_bytes: usize,
}

impl StateSizeStrategy {
    /// Creates a size strategy with the given byte threshold.
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl SnapshotStrategy for StateSizeStrategy {
    fn should_snapshot(&self, decision: &SnapshotDecision) -> bool {
        decision.state_size.map_or(false, |size| size >= self.max_bytes)
    }

    fn needs_state_size(&self) -> bool {
        true
    }
}

/// Decides when compaction is worthwhile and produces/consumes snapshots,
/// transparently to the aggregate.
pub struct SnapshotManager<A, ES>
where
    A: Aggregate,
    ES: EventStore<Event = A::Event>,
{
    event_store: Arc<ES>,
    snapshot_store: Arc<dyn SnapshotStore<State = A::State>>,
    count_strategy: EventCountStrategy,
    extra_strategies: Vec<Box<dyn SnapshotStrategy>>,
}

impl<A, ES> SnapshotManager<A, ES>
where
    A: Aggregate,
    ES: EventStore<Event = A::Event>,
{
    /// Creates a manager with the default event-count strategy.
    pub fn new(
        event_store: Arc<ES>,
        snapshot_store: Arc<dyn SnapshotStore<State = A::State>>,
    ) -> Self {
        Self {
            event_store,
            snapshot_store,
            count_strategy: EventCountStrategy::default(),
            extra_strategies: Vec::new(),
        }
    }

    /// Overrides the mandatory event-count threshold.
    #[must_use]
    pub const fn with_event_count_threshold(mut self, threshold: u64) -> Self {
        self.count_strategy = EventCountStrategy::new(threshold);
        self
    }

    /// Adds an additional strategy to the OR set.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl SnapshotStrategy + 'static) -> Self {
        self.extra_strategies.push(Box::new(strategy));
        self
    }

    /// Loads the latest snapshot plus the residual event tail
    /// (`stream_version > snapshot.version`).
    ///
    /// A snapshot-store failure degrades to `None` (full replay) with a
    /// warning; an event-store failure on the residual read is a
    /// correctness-path error and propagates.
    pub async fn load(
        &self,
        stream_id: &StreamId,
    ) -> EventStoreResult<Option<(Snapshot<A::State>, Vec<StoredEvent<A::Event>>)>> {
        let snapshot = match self.snapshot_store.load(stream_id).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(%stream_id, %error, "snapshot load failed, falling back to full replay");
                None
            }
        };

        let Some(snapshot) = snapshot else {
            return Ok(None);
        };

        let tail = self
            .event_store
            .read_stream(stream_id, &ReadOptions::new().after_version(snapshot.version))
            .await?;
        Ok(Some((snapshot, tail)))
    }

    /// Evaluates the strategy set and captures a snapshot if any strategy
    /// fires. Returns whether a snapshot was created.
    ///
    /// All failures on this path are logged and swallowed: compaction is
    /// never allowed to fail a save.
    pub async fn maybe_snapshot(
        &self,
        stream_id: &StreamId,
        state: &A::State,
        current_version: EventVersion,
    ) -> bool {
        let previous = match self.snapshot_store.load(stream_id).await {
            Ok(previous) => previous,
            Err(error) => {
                warn!(%stream_id, %error, "snapshot lookup failed, skipping compaction check");
                return false;
            }
        };

        let events_since = previous.as_ref().map_or_else(
            || current_version.event_count(),
            |snapshot| {
                let current: u64 = current_version.into();
                let at: u64 = snapshot.version.into();
                current.saturating_sub(at)
            },
        );

        let state_size = if self.needs_state_size() {
            serde_json::to_vec(state).ok().map(|bytes| bytes.len())
        } else {
            None
        };

        let decision = SnapshotDecision {
            current_version,
            events_since_snapshot: events_since,
            last_snapshot_at: previous.as_ref().map(|s| s.taken_at),
            now: Timestamp::now(),
            state_size,
        };

        if !self.should_snapshot(&decision) {
            return false;
        }

        let state = match deep_copy::<A::State>(state) {
            Ok(copy) => copy,
            Err(error) => {
                warn!(%stream_id, %error, "snapshot state copy failed, skipping compaction");
                return false;
            }
        };

        let snapshot = Snapshot {
            stream_id: stream_id.clone(),
            version: current_version,
            state,
            taken_at: decision.now,
        };

        match self.snapshot_store.save(snapshot).await {
            Ok(()) => {
                debug!(%stream_id, version = %current_version, "snapshot created");
                true
            }
            Err(error) => {
                warn!(%stream_id, %error, "snapshot save failed, continuing without");
                false
            }
        }
    }

    /// Purges snapshots taken before `older_than`, returning the number
    /// deleted.
    pub async fn cleanup(&self, older_than: Timestamp) -> SnapshotResult<usize> {
        self.snapshot_store.cleanup(older_than).await
    }

    fn should_snapshot(&self, decision: &SnapshotDecision) -> bool {
        self.count_strategy.should_snapshot(decision)
            || self
                .extra_strategies
                .iter()
                .any(|strategy| strategy.should_snapshot(decision))
    }

    fn needs_state_size(&self) -> bool {
        self.extra_strategies
            .iter()
            .any(|strategy| strategy.needs_state_size())
    }
}

/// Deep-copies state through a serde round-trip so later live mutation
/// cannot corrupt the stored capture.
fn deep_copy<S: Serialize + DeserializeOwned>(state: &S) -> SnapshotResult<S> {
    let value =
        serde_json::to_value(state).map_err(|e| SnapshotError::Serialization(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| SnapshotError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(events_since: u64) -> SnapshotDecision {
        SnapshotDecision {
            current_version: EventVersion::new(events_since.saturating_sub(1)),
            events_since_snapshot: events_since,
            last_snapshot_at: None,
            now: Timestamp::now(),
            state_size: None,
        }
    }

    #[test]
    fn event_count_strategy_fires_at_threshold() {
        let strategy = EventCountStrategy::default();
        assert!(!strategy.should_snapshot(&decision(49)));
        assert!(strategy.should_snapshot(&decision(50)));
        assert!(strategy.should_snapshot(&decision(51)));
    }

    #[test]
    fn event_count_strategy_clamps_zero_threshold() {
        let strategy = EventCountStrategy::new(0);
        assert!(!strategy.should_snapshot(&decision(0)));
        assert!(strategy.should_snapshot(&decision(1)));
    }

    #[test]
    fn time_strategy_fires_when_stale() {
        let strategy = TimeIntervalStrategy::new(Duration::minutes(5));
        let now = Timestamp::now();

        let stale = SnapshotDecision {
            last_snapshot_at: Some(Timestamp::new(
                *now.as_datetime() - Duration::minutes(10),
            )),
            now,
            ..decision(1)
        };
        assert!(strategy.should_snapshot(&stale));

        let fresh = SnapshotDecision {
            last_snapshot_at: Some(Timestamp::new(
                *now.as_datetime() - Duration::minutes(1),
            )),
            now,
            ..decision(1)
        };
        assert!(!strategy.should_snapshot(&fresh));
    }

    #[test]
    fn time_strategy_fires_without_prior_snapshot() {
        let strategy = TimeIntervalStrategy::new(Duration::hours(1));
        assert!(strategy.should_snapshot(&decision(1)));
    }

    #[test]
    fn size_strategy_requires_state_size() {
        let strategy = StateSizeStrategy::new(1024);
        assert!(strategy.needs_state_size());
        assert!(!strategy.should_snapshot(&decision(1)));

        let large = SnapshotDecision {
            state_size: Some(4096),
            ..decision(1)
        };
        assert!(strategy.should_snapshot(&large));
    }

    #[test]
    fn deep_copy_produces_equal_independent_value() {
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
        struct State {
            items: Vec<String>,
        }

        let mut original = State {
            items: vec!["a".to_string()],
        };
        let copy = deep_copy(&original).unwrap();
        original.items.push("b".to_string());

        assert_eq!(copy.items, vec!["a".to_string()]);
    }
}
