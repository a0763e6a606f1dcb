//! The bank-account aggregate used across the integration suite.

use serde::{Deserialize, Serialize};

use factlog::errors::{CommandError, CommandResult};
use factlog::event::DomainEvent;
use factlog::Aggregate;

/// Everything that can happen to an account. Amounts are in cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    /// The account was opened for an owner.
    Opened {
        /// Display name of the account owner.
        owner: String,
    },
    /// Money was deposited.
    Deposited {
        /// Deposit amount in cents.
        amount: u64,
    },
    /// Money was withdrawn.
    Withdrawn {
        /// Withdrawal amount in cents.
        amount: u64,
    },
    /// The account was closed.
    Closed,
}

impl DomainEvent for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Opened { .. } => "AccountOpened",
            Self::Deposited { .. } => "MoneyDeposited",
            Self::Withdrawn { .. } => "MoneyWithdrawn",
            Self::Closed => "AccountClosed",
        }
    }
}

/// Commands a caller can issue against an account.
#[derive(Debug, Clone)]
pub enum AccountCommand {
    /// Open a new account.
    Open {
        /// Display name of the account owner.
        owner: String,
    },
    /// Deposit money into an open account.
    Deposit {
        /// Deposit amount in cents; must be positive.
        amount: u64,
    },
    /// Withdraw money from an open account.
    Withdraw {
        /// Withdrawal amount in cents; must be positive and covered.
        amount: u64,
    },
    /// Close an open account with a zero balance.
    Close,
}

/// Account state folded from the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Display name of the account owner.
    pub owner: String,
    /// Current balance in cents.
    pub balance: u64,
    /// Whether the account is open for business.
    pub open: bool,
}

/// The account aggregate: pure fold + pure decision function.
pub struct Account;

impl Aggregate for Account {
    type State = AccountState;
    type Event = AccountEvent;
    type Command = AccountCommand;

    fn aggregate_type() -> &'static str {
        "Account"
    }

    fn apply(state: Option<Self::State>, event: &Self::Event) -> Self::State {
        match (state, event) {
            (None, AccountEvent::Opened { owner }) => AccountState {
                owner: owner.clone(),
                balance: 0,
                open: true,
            },
            (Some(mut state), AccountEvent::Deposited { amount }) => {
                state.balance += amount;
                state
            }
            (Some(mut state), AccountEvent::Withdrawn { amount }) => {
                state.balance = state.balance.saturating_sub(*amount);
                state
            }
            (Some(mut state), AccountEvent::Closed) => {
                state.open = false;
                state
            }
            // decide never produces these sequences; folding them anyway
            // keeps apply total.
            (Some(state), AccountEvent::Opened { .. }) => state,
            (None, event) => AccountState {
                owner: String::new(),
                balance: match event {
                    AccountEvent::Deposited { amount } => *amount,
                    _ => 0,
                },
                open: !matches!(event, AccountEvent::Closed),
            },
        }
    }

    fn decide(
        state: Option<&Self::State>,
        command: Self::Command,
    ) -> CommandResult<Vec<Self::Event>> {
        match command {
            AccountCommand::Open { owner } => {
                if state.is_some() {
                    return Err(CommandError::BusinessRuleViolation(
                        "account already opened".to_string(),
                    ));
                }
                if owner.trim().is_empty() {
                    return Err(CommandError::ValidationFailed(
                        "owner must not be empty".to_string(),
                    ));
                }
                Ok(vec![AccountEvent::Opened { owner }])
            }
            AccountCommand::Deposit { amount } => {
                require_open(state)?;
                if amount == 0 {
                    return Err(CommandError::ValidationFailed(
                        "deposit must be positive".to_string(),
                    ));
                }
                Ok(vec![AccountEvent::Deposited { amount }])
            }
            AccountCommand::Withdraw { amount } => {
                let state = require_open(state)?;
                if amount == 0 {
                    return Err(CommandError::ValidationFailed(
                        "withdrawal must be positive".to_string(),
                    ));
                }
                if amount > state.balance {
                    return Err(CommandError::BusinessRuleViolation(format!(
                        "insufficient funds: balance {} cents, requested {} cents",
                        state.balance, amount
                    )));
                }
                Ok(vec![AccountEvent::Withdrawn { amount }])
            }
            AccountCommand::Close => {
                let state = require_open(state)?;
                if state.balance != 0 {
                    return Err(CommandError::BusinessRuleViolation(format!(
                        "cannot close with non-zero balance of {} cents",
                        state.balance
                    )));
                }
                Ok(vec![AccountEvent::Closed])
            }
        }
    }
}

fn require_open(state: Option<&AccountState>) -> Result<&AccountState, CommandError> {
    match state {
        None => Err(CommandError::BusinessRuleViolation(
            "account does not exist".to_string(),
        )),
        Some(state) if !state.open => Err(CommandError::BusinessRuleViolation(
            "account is closed".to_string(),
        )),
        Some(state) => Ok(state),
    }
}
