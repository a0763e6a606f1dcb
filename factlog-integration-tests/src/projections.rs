//! Read models over the account stream, used to exercise the projection
//! engine.

use std::collections::HashMap;

use factlog::errors::{ProjectionError, ProjectionResult};
use factlog::event::StoredEvent;
use factlog::subscription::EventFilter;
use factlog::types::{ProjectionName, StreamId};
use factlog::Projection;

use crate::account::AccountEvent;

/// Current balance per open account stream. Closing an account removes its
/// entry.
pub struct BalanceProjection;

impl Projection for BalanceProjection {
    type Event = AccountEvent;
    type State = HashMap<StreamId, u64>;

    fn name(&self) -> ProjectionName {
        ProjectionName::try_new("account-balances").expect("static name is valid")
    }

    fn initial_state(&self) -> Self::State {
        HashMap::new()
    }

    fn apply(
        &self,
        state: &mut Self::State,
        event: &StoredEvent<Self::Event>,
    ) -> ProjectionResult<()> {
        match &event.payload {
            AccountEvent::Opened { .. } => {
                state.insert(event.stream_id.clone(), 0);
            }
            AccountEvent::Deposited { amount } => {
                *state.entry(event.stream_id.clone()).or_insert(0) += amount;
            }
            AccountEvent::Withdrawn { amount } => {
                let balance = state.entry(event.stream_id.clone()).or_insert(0);
                *balance = balance.saturating_sub(*amount);
            }
            AccountEvent::Closed => {
                state.remove(&event.stream_id);
            }
        }
        Ok(())
    }
}

/// Total cents ever deposited, subscribed selectively to deposit events
/// only.
pub struct DepositVolumeProjection;

impl Projection for DepositVolumeProjection {
    type Event = AccountEvent;
    type State = u64;

    fn name(&self) -> ProjectionName {
        ProjectionName::try_new("deposit-volume").expect("static name is valid")
    }

    fn initial_state(&self) -> Self::State {
        0
    }

    fn apply(
        &self,
        state: &mut Self::State,
        event: &StoredEvent<Self::Event>,
    ) -> ProjectionResult<()> {
        if let AccountEvent::Deposited { amount } = &event.payload {
            *state += amount;
        }
        Ok(())
    }

    fn filter(&self) -> EventFilter {
        EventFilter::all().with_event_type("MoneyDeposited")
    }
}

/// Counts events until it hits a withdrawal, then fails. Used to verify the
/// engine faults the projection and freezes its checkpoint.
pub struct PoisonedProjection;

impl Projection for PoisonedProjection {
    type Event = AccountEvent;
    type State = u64;

    fn name(&self) -> ProjectionName {
        ProjectionName::try_new("poisoned").expect("static name is valid")
    }

    fn initial_state(&self) -> Self::State {
        0
    }

    fn apply(
        &self,
        state: &mut Self::State,
        event: &StoredEvent<Self::Event>,
    ) -> ProjectionResult<()> {
        if matches!(event.payload, AccountEvent::Withdrawn { .. }) {
            return Err(ProjectionError::handler("cannot handle withdrawals"));
        }
        *state += 1;
        Ok(())
    }
}
