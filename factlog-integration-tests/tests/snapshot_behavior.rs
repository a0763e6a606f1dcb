//! Snapshot creation, compacted loading, and degradation when the snapshot
//! store misbehaves.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use factlog::snapshot::{SnapshotManager, SnapshotStore};
use factlog::types::{EventVersion, StreamId, Timestamp};
use factlog::Repository;
use factlog_integration_tests::account::{Account, AccountCommand, AccountEvent, AccountState};
use factlog_integration_tests::init_test_tracing;
use factlog_integration_tests::unreliable::UnreliableSnapshotStore;
use factlog_memory::{InMemoryEventStore, InMemorySnapshotStore};

type Store = InMemoryEventStore<AccountEvent>;

fn manager(
    store: &Arc<Store>,
    snapshots: Arc<dyn SnapshotStore<State = AccountState>>,
    threshold: u64,
) -> SnapshotManager<Account, Store> {
    SnapshotManager::new(Arc::clone(store), snapshots).with_event_count_threshold(threshold)
}

async fn open_account(repo: &Repository<Account, Store>, id: Uuid) {
    let mut account = repo.load(id).await.unwrap();
    account
        .execute(AccountCommand::Open {
            owner: "alice".to_string(),
        })
        .unwrap();
    repo.save(&mut account).await.unwrap();
}

async fn deposit_n_times(repo: &Repository<Account, Store>, id: Uuid, count: u64) {
    for i in 0..count {
        let mut account = repo.load_existing(id).await.unwrap();
        account
            .execute(AccountCommand::Deposit { amount: i + 1 })
            .unwrap();
        repo.save(&mut account).await.unwrap();
    }
}

#[tokio::test]
async fn snapshot_appears_once_threshold_is_crossed() {
    let store = Arc::new(Store::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repo: Repository<Account, Store> = Repository::builder(Arc::clone(&store))
        .with_snapshots(manager(&store, snapshots.clone(), 5))
        .build();

    let id = Uuid::now_v7();
    open_account(&repo, id).await;
    deposit_n_times(&repo, id, 3).await;

    // Four events so far; below the threshold of five.
    let stream = StreamId::for_aggregate("Account", id);
    assert!(snapshots.load(&stream).await.unwrap().is_none());

    deposit_n_times(&repo, id, 1).await;
    let snapshot = snapshots.load(&stream).await.unwrap().unwrap();
    assert_eq!(snapshot.version, EventVersion::new(4));
    assert_eq!(snapshot.state.balance, 1 + 2 + 3 + 1);
}

#[tokio::test]
async fn default_threshold_snapshots_after_fifty_events() {
    let store = Arc::new(Store::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repo: Repository<Account, Store> = Repository::builder(Arc::clone(&store))
        .with_snapshots(SnapshotManager::new(Arc::clone(&store), snapshots.clone()))
        .build();

    let id = Uuid::now_v7();
    open_account(&repo, id).await;
    deposit_n_times(&repo, id, 48).await;

    let stream = StreamId::for_aggregate("Account", id);
    assert!(snapshots.load(&stream).await.unwrap().is_none());

    // The fiftieth event crosses the default threshold.
    deposit_n_times(&repo, id, 1).await;
    let snapshot = snapshots.load(&stream).await.unwrap().unwrap();
    assert_eq!(snapshot.version, EventVersion::new(49));
}

#[tokio::test]
async fn snapshot_load_is_equivalent_to_full_replay() {
    let store = Arc::new(Store::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let snapshotting: Repository<Account, Store> = Repository::builder(Arc::clone(&store))
        .with_snapshots(manager(&store, snapshots.clone(), 5))
        .build();
    let replaying: Repository<Account, Store> = Repository::new(Arc::clone(&store));

    let id = Uuid::now_v7();
    open_account(&snapshotting, id).await;
    deposit_n_times(&snapshotting, id, 12).await;

    // Only the latest capture is retained, strictly behind the stream head.
    let stream = StreamId::for_aggregate("Account", id);
    let snapshot = snapshots.load(&stream).await.unwrap().unwrap();
    assert_eq!(snapshots.snapshot_count(), 1);
    assert!(snapshot.version <= EventVersion::new(12));

    let via_snapshot = snapshotting.load_existing(id).await.unwrap();
    let via_replay = replaying.load_existing(id).await.unwrap();
    assert_eq!(via_snapshot.state(), via_replay.state());
    assert_eq!(via_snapshot.version(), via_replay.version());
}

#[tokio::test]
async fn failing_snapshot_store_degrades_to_full_replay() {
    init_test_tracing();
    let store = Arc::new(Store::new());
    let snapshots = Arc::new(UnreliableSnapshotStore::new());
    let repo: Repository<Account, Store> = Repository::builder(Arc::clone(&store))
        .with_snapshots(manager(&store, snapshots.clone(), 3))
        .build();

    let id = Uuid::now_v7();
    open_account(&repo, id).await;
    deposit_n_times(&repo, id, 5).await;
    assert_eq!(snapshots.snapshot_count(), 1);

    snapshots.set_failing(true);

    // Loads fall back to replay, saves still succeed without compaction.
    let mut account = repo.load_existing(id).await.unwrap();
    assert_eq!(account.state().unwrap().balance, 1 + 2 + 3 + 4 + 5);
    account.execute(AccountCommand::Deposit { amount: 100 }).unwrap();
    repo.save(&mut account).await.unwrap();
    assert_eq!(snapshots.snapshot_count(), 1);

    snapshots.set_failing(false);
    let healed = repo.load_existing(id).await.unwrap();
    assert_eq!(healed.state().unwrap().balance, 115);
}

#[tokio::test]
async fn cleanup_purges_stale_snapshots() {
    let store = Arc::new(Store::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let retention = manager(&store, snapshots.clone(), 2);
    let repo: Repository<Account, Store> = Repository::builder(Arc::clone(&store))
        .with_snapshots(manager(&store, snapshots.clone(), 2))
        .build();

    let id = Uuid::now_v7();
    open_account(&repo, id).await;
    deposit_n_times(&repo, id, 2).await;
    assert_eq!(snapshots.snapshot_count(), 1);

    // Nothing is older than an hour ago.
    let hour_ago = Timestamp::new(*Timestamp::now().as_datetime() - Duration::hours(1));
    assert_eq!(retention.cleanup(hour_ago).await.unwrap(), 0);

    // Everything is older than a cutoff in the future.
    let future = Timestamp::new(*Timestamp::now().as_datetime() + Duration::hours(1));
    assert_eq!(retention.cleanup(future).await.unwrap(), 1);
    assert_eq!(snapshots.snapshot_count(), 0);
}
