//! Property tests for the invariants the rest of the suite checks by
//! example: replay determinism, order preservation, and checkpoint
//! monotonicity.

use std::sync::Arc;

use proptest::prelude::*;
use uuid::Uuid;

use factlog::aggregate::fold;
use factlog::checkpoint::CheckpointStore;
use factlog::event_store::{EventStore, ExpectedVersion};
use factlog::types::{GlobalPosition, ProjectionName};
use factlog::{NewEvent, Repository};
use factlog_integration_tests::account::{Account, AccountCommand, AccountEvent};
use factlog_memory::{InMemoryCheckpointStore, InMemoryEventStore};

fn deposit_events(amounts: &[u64]) -> Vec<AccountEvent> {
    std::iter::once(AccountEvent::Opened {
        owner: "alice".to_string(),
    })
    .chain(
        amounts
            .iter()
            .map(|&amount| AccountEvent::Deposited { amount }),
    )
    .collect()
}

proptest! {
    #[test]
    fn replay_is_deterministic(amounts in proptest::collection::vec(1u64..10_000, 0..30)) {
        let events = deposit_events(&amounts);
        let first = fold::<Account>(&events);
        let second = fold::<Account>(&events);
        prop_assert_eq!(&first, &second);

        let expected: u64 = amounts.iter().sum();
        prop_assert_eq!(first.unwrap().balance, expected);
    }

    #[test]
    fn store_replay_matches_pure_fold(amounts in proptest::collection::vec(1u64..10_000, 1..20)) {
        let events = deposit_events(&amounts);
        let loaded = tokio_test::block_on(async {
            let store = Arc::new(InMemoryEventStore::new());
            let id = Uuid::now_v7();
            let stream = factlog::StreamId::for_aggregate("Account", id);
            let batch = events.iter().cloned().map(NewEvent::new).collect();
            store
                .append(&stream, ExpectedVersion::NoStream, batch)
                .await
                .unwrap();

            let repo: Repository<Account, _> = Repository::new(store);
            repo.load_existing(id).await.unwrap().state().cloned()
        });
        prop_assert_eq!(loaded, fold::<Account>(&events));
    }

    #[test]
    fn command_cycle_never_overdraws(
        operations in proptest::collection::vec(
            (proptest::bool::ANY, 1u64..1_000),
            1..30,
        )
    ) {
        let final_balance = tokio_test::block_on(async {
            let store = Arc::new(InMemoryEventStore::new());
            let repo: Repository<Account, _> = Repository::new(store);
            let id = Uuid::now_v7();

            let mut account = repo.load(id).await.unwrap();
            account
                .execute(AccountCommand::Open {
                    owner: "alice".to_string(),
                })
                .unwrap();
            repo.save(&mut account).await.unwrap();

            for (is_deposit, amount) in operations {
                let mut account = repo.load_existing(id).await.unwrap();
                let command = if is_deposit {
                    AccountCommand::Deposit { amount }
                } else {
                    AccountCommand::Withdraw { amount }
                };
                // Overdrafts are rejected without producing events.
                let _ = account.execute(command);
                repo.save(&mut account).await.unwrap();
            }

            repo.load_existing(id).await.unwrap().state().unwrap().balance
        });
        // Every accepted withdrawal was covered, so the replayed balance
        // stays within what the deposits alone could produce.
        prop_assert!(final_balance < 30 * 1_000);
    }

    #[test]
    fn global_positions_are_strictly_increasing(
        batches in proptest::collection::vec(1usize..5, 1..10)
    ) {
        let positions = tokio_test::block_on(async {
            let store: InMemoryEventStore<AccountEvent> = InMemoryEventStore::new();
            for (index, batch_len) in batches.iter().enumerate() {
                let stream =
                    factlog::StreamId::try_new(format!("Account-{index}")).unwrap();
                let batch = (0..*batch_len)
                    .map(|_| NewEvent::new(AccountEvent::Deposited { amount: 1 }))
                    .collect();
                store
                    .append(&stream, ExpectedVersion::NoStream, batch)
                    .await
                    .unwrap();
            }
            let all = store.read_all(GlobalPosition::start(), None).await.unwrap();
            all.iter().map(|e| u64::from(e.global_position)).collect::<Vec<_>>()
        });

        let total: usize = batches.iter().sum();
        prop_assert_eq!(positions.len(), total);
        for (index, position) in positions.iter().enumerate() {
            prop_assert_eq!(*position, u64::try_from(index).unwrap() + 1);
        }
    }

    #[test]
    fn checkpoints_are_monotonic(positions in proptest::collection::vec(0u64..1_000, 1..40)) {
        let outcome = tokio_test::block_on(async {
            let store = InMemoryCheckpointStore::new();
            let name = ProjectionName::try_new("prop").unwrap();

            let mut high_water = None;
            for position in positions {
                let position = GlobalPosition::new(position);
                let result = store.save(&name, position).await;
                match high_water {
                    Some(current) if position < current => {
                        if result.is_ok() {
                            return Err("regression accepted");
                        }
                    }
                    _ => {
                        if result.is_err() {
                            return Err("forward save rejected");
                        }
                        high_water = Some(position);
                    }
                }
            }
            let stored = store.load(&name).await.unwrap();
            if stored == high_water {
                Ok(())
            } else {
                Err("stored checkpoint is not the high-water mark")
            }
        });
        prop_assert_eq!(outcome, Ok(()));
    }
}
