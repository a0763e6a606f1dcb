//! End-to-end command cycle through the repository over the in-memory
//! store.

use std::sync::Arc;

use uuid::Uuid;

use factlog::errors::{CommandError, EventStoreError};
use factlog::event_store::{EventStore, ExpectedVersion, ReadOptions};
use factlog::types::{EventVersion, StreamId};
use factlog::{EventMetadata, Repository};
use factlog_integration_tests::account::{Account, AccountCommand, AccountEvent};
use factlog_memory::InMemoryEventStore;

fn setup() -> (Arc<InMemoryEventStore<AccountEvent>>, Repository<Account, InMemoryEventStore<AccountEvent>>) {
    let store = Arc::new(InMemoryEventStore::new());
    let repo = Repository::new(Arc::clone(&store));
    (store, repo)
}

#[tokio::test]
async fn open_deposit_withdraw_round_trip() {
    let (_, repo) = setup();
    let id = Uuid::now_v7();

    let mut account = repo.load(id).await.unwrap();
    account
        .execute(AccountCommand::Open {
            owner: "alice".to_string(),
        })
        .unwrap();
    account.execute(AccountCommand::Deposit { amount: 500 }).unwrap();
    repo.save(&mut account).await.unwrap();

    let mut reloaded = repo.load_existing(id).await.unwrap();
    assert_eq!(reloaded.state().unwrap().balance, 500);
    assert_eq!(reloaded.version(), Some(EventVersion::new(1)));

    reloaded
        .execute(AccountCommand::Withdraw { amount: 200 })
        .unwrap();
    repo.save(&mut reloaded).await.unwrap();

    let final_state = repo.load_existing(id).await.unwrap();
    assert_eq!(final_state.state().unwrap().balance, 300);
    assert_eq!(final_state.version(), Some(EventVersion::new(2)));
}

#[tokio::test]
async fn load_existing_rejects_unknown_aggregate() {
    let (_, repo) = setup();
    let err = repo.load_existing(Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(err, CommandError::AggregateNotFound { .. }));
}

#[tokio::test]
async fn rejected_commands_persist_nothing() {
    let (store, repo) = setup();
    let id = Uuid::now_v7();

    let mut account = repo.load(id).await.unwrap();
    account
        .execute(AccountCommand::Open {
            owner: "alice".to_string(),
        })
        .unwrap();
    repo.save(&mut account).await.unwrap();

    let mut account = repo.load_existing(id).await.unwrap();
    let err = account
        .execute(AccountCommand::Withdraw { amount: 100 })
        .unwrap_err();
    assert!(matches!(err, CommandError::BusinessRuleViolation(_)));

    // Saving after a rejection is a no-op: only the open event exists.
    repo.save(&mut account).await.unwrap();
    let stream = StreamId::for_aggregate("Account", id);
    let events = store.read_stream(&stream, &ReadOptions::new()).await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn concurrent_saves_conflict_and_survive_retry() {
    let (_, repo) = setup();
    let id = Uuid::now_v7();

    let mut account = repo.load(id).await.unwrap();
    account
        .execute(AccountCommand::Open {
            owner: "alice".to_string(),
        })
        .unwrap();
    account.execute(AccountCommand::Deposit { amount: 100 }).unwrap();
    repo.save(&mut account).await.unwrap();

    // Two sessions load the same version, both decide, one wins.
    let mut first = repo.load_existing(id).await.unwrap();
    let mut second = repo.load_existing(id).await.unwrap();

    first.execute(AccountCommand::Deposit { amount: 50 }).unwrap();
    repo.save(&mut first).await.unwrap();

    second.execute(AccountCommand::Withdraw { amount: 80 }).unwrap();
    let err = repo.save(&mut second).await.unwrap_err();
    match err {
        CommandError::ConcurrencyConflict {
            expected, actual, ..
        } => {
            assert_eq!(expected, ExpectedVersion::Exact(EventVersion::new(1)));
            assert_eq!(actual, Some(EventVersion::new(2)));
        }
        other => panic!("expected concurrency conflict, got {other:?}"),
    }

    // The loser reloads fresh state and retries its decision.
    let mut retried = repo.load_existing(id).await.unwrap();
    assert_eq!(retried.state().unwrap().balance, 150);
    retried.execute(AccountCommand::Withdraw { amount: 80 }).unwrap();
    repo.save(&mut retried).await.unwrap();

    let settled = repo.load_existing(id).await.unwrap();
    assert_eq!(settled.state().unwrap().balance, 70);
}

#[tokio::test]
async fn direct_append_scenario_matches_expectations() {
    // The canonical optimistic-concurrency walk-through, straight against
    // the store.
    let store: InMemoryEventStore<AccountEvent> = InMemoryEventStore::new();
    let stream = StreamId::try_new("User-1").unwrap();

    let v0 = store
        .append(
            &stream,
            ExpectedVersion::NoStream,
            vec![factlog::NewEvent::new(AccountEvent::Opened {
                owner: "u".to_string(),
            })],
        )
        .await
        .unwrap();
    assert_eq!(v0, EventVersion::new(0));

    let v1 = store
        .append(
            &stream,
            ExpectedVersion::Exact(v0),
            vec![factlog::NewEvent::new(AccountEvent::Deposited { amount: 10 })],
        )
        .await
        .unwrap();
    assert_eq!(v1, EventVersion::new(1));

    let stale = store
        .append(
            &stream,
            ExpectedVersion::Exact(v0),
            vec![factlog::NewEvent::new(AccountEvent::Deposited { amount: 99 })],
        )
        .await
        .unwrap_err();
    assert!(matches!(stale, EventStoreError::VersionConflict { .. }));

    let tail = store
        .read_stream(&stream, &ReadOptions::new().after_version(v0))
        .await
        .unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].stream_version, v1);
}

#[tokio::test]
async fn cached_repository_stays_consistent_across_writers() {
    let (store, _) = setup();
    let cached: Repository<Account, _> =
        Repository::builder(Arc::clone(&store)).with_cache().build();
    let direct: Repository<Account, _> = Repository::new(Arc::clone(&store));

    let id = Uuid::now_v7();
    let mut account = cached.load(id).await.unwrap();
    account
        .execute(AccountCommand::Open {
            owner: "alice".to_string(),
        })
        .unwrap();
    cached.save(&mut account).await.unwrap();

    // A writer that bypasses the cache appends behind its back.
    let mut other = direct.load_existing(id).await.unwrap();
    other.execute(AccountCommand::Deposit { amount: 75 }).unwrap();
    direct.save(&mut other).await.unwrap();

    // The cached load replays the newer tail on top of the cached entry.
    let fresh = cached.load_existing(id).await.unwrap();
    assert_eq!(fresh.state().unwrap().balance, 75);
    assert_eq!(fresh.version(), Some(EventVersion::new(1)));
}

#[tokio::test]
async fn metadata_is_stamped_on_every_event_in_batch() {
    let (store, repo) = setup();
    let id = Uuid::now_v7();

    let correlation = factlog::CorrelationId::new();
    let metadata = EventMetadata::new()
        .with_correlation_id(correlation)
        .with_actor(factlog::Actor::try_new("teller-7").unwrap());

    let mut account = repo.load(id).await.unwrap();
    account
        .execute(AccountCommand::Open {
            owner: "alice".to_string(),
        })
        .unwrap();
    account.execute(AccountCommand::Deposit { amount: 20 }).unwrap();
    repo.save_with_metadata(&mut account, metadata).await.unwrap();

    let stream = StreamId::for_aggregate("Account", id);
    let events = store.read_stream(&stream, &ReadOptions::new()).await.unwrap();
    assert_eq!(events.len(), 2);
    for event in events {
        assert_eq!(event.metadata.correlation_id, Some(correlation));
        assert_eq!(
            event.metadata.actor.as_ref().map(AsRef::as_ref),
            Some("teller-7")
        );
    }
}
