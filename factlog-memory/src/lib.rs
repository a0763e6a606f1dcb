//! In-memory adapters for the `factlog` event sourcing engine.
//!
//! This crate implements the `factlog` storage ports (`EventStore`,
//! `SnapshotStore`, and `CheckpointStore`) against process memory, useful
//! for testing and development scenarios where persistence is not required.
//!
//! The stores uphold the same contracts durable backends must: atomic
//! batches, contiguous stream versions, strictly increasing global
//! positions, version-conflict reporting, and monotonic checkpoints.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

mod checkpoint_store;
mod event_store;
mod snapshot_store;

pub use checkpoint_store::InMemoryCheckpointStore;
pub use event_store::InMemoryEventStore;
pub use snapshot_store::InMemorySnapshotStore;
