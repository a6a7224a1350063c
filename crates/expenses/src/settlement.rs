//! Split settlement: the only path by which a split's `settled` flag changes.
//!
//! State machine per split: `Unsettled → Settled`, terminal. Settlement is
//! confirmed by the expense's **payer** (the person owed money attests that
//! the debtor paid them back through an out-of-band channel). Settling an
//! already-settled split decides no events, which makes retried requests
//! exact no-ops end to end: the dispatcher appends nothing and projections
//! see nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fairshare_core::{DomainError, UserId};

use crate::expense::{Expense, ExpenseEvent, ExpenseId};

/// Command: SettleSplit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleSplit {
    pub expense_id: ExpenseId,
    /// The debtor whose split is being marked settled.
    pub participant: UserId,
    /// Caller identity; must equal the expense's payer.
    pub requester: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SplitSettled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSettled {
    pub expense_id: ExpenseId,
    pub participant: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl Expense {
    pub(crate) fn handle_settle(&self, cmd: &SettleSplit) -> Result<Vec<ExpenseEvent>, DomainError> {
        if !self.exists() {
            return Err(DomainError::ExpenseNotFound);
        }
        self.ensure_expense_id(cmd.expense_id)?;
        self.ensure_payer(cmd.requester)?;

        let split = self
            .split_for(cmd.participant)
            .ok_or(DomainError::ParticipantNotFound)?;

        // Idempotent: already settled is success, not an error.
        if split.settled {
            return Ok(vec![]);
        }

        Ok(vec![ExpenseEvent::SplitSettled(SplitSettled {
            expense_id: cmd.expense_id,
            participant: cmd.participant,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expense::{
        ExpenseCategory, ExpenseCommand, RecordExpense, SplitInput,
    };
    use fairshare_core::{Aggregate, AggregateId, Currency, Money};

    fn usd() -> Currency {
        Currency::new("USD").unwrap()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn recorded(payer: UserId, splits: Vec<(UserId, i64)>) -> Expense {
        let expense_id = ExpenseId::new(AggregateId::new());
        let amount: i64 = splits.iter().map(|(_, minor)| minor).sum();
        let mut expense = Expense::empty(expense_id);
        let cmd = RecordExpense {
            expense_id,
            payer,
            description: "Groceries".to_string(),
            amount: Money::new(amount, usd()),
            category: ExpenseCategory::Food,
            incurred_on: test_time(),
            group_id: None,
            splits: splits
                .into_iter()
                .map(|(user_id, minor)| SplitInput {
                    user_id,
                    amount: Money::new(minor, usd()),
                })
                .collect(),
            occurred_at: test_time(),
        };
        let events = expense
            .handle(&ExpenseCommand::RecordExpense(cmd))
            .unwrap();
        expense.apply(&events[0]);
        expense
    }

    fn settle(expense: &Expense, participant: UserId, requester: UserId) -> SettleSplit {
        SettleSplit {
            expense_id: expense.id_typed(),
            participant,
            requester,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn payer_settles_a_participant_split() {
        let payer = UserId::new();
        let a = UserId::new();
        let b = UserId::new();
        let mut expense = recorded(payer, vec![(a, 500), (b, 500)]);

        let events = expense
            .handle(&ExpenseCommand::SettleSplit(settle(&expense, a, payer)))
            .unwrap();
        assert_eq!(events.len(), 1);
        expense.apply(&events[0]);

        assert!(expense.split_for(a).unwrap().settled);
        assert!(!expense.split_for(b).unwrap().settled);
        assert!(!expense.is_settled());
    }

    #[test]
    fn settling_the_last_open_split_marks_expense_settled() {
        let payer = UserId::new();
        let a = UserId::new();
        let mut expense = recorded(payer, vec![(payer, 500), (a, 500)]);

        // Payer's convenience split is already settled, so only a's is open.
        let events = expense
            .handle(&ExpenseCommand::SettleSplit(settle(&expense, a, payer)))
            .unwrap();
        expense.apply(&events[0]);

        assert!(expense.is_settled());
    }

    #[test]
    fn settle_is_idempotent() {
        let payer = UserId::new();
        let a = UserId::new();
        let mut expense = recorded(payer, vec![(a, 500)]);

        let events = expense
            .handle(&ExpenseCommand::SettleSplit(settle(&expense, a, payer)))
            .unwrap();
        expense.apply(&events[0]);
        let state_after_first = expense.clone();

        // Second identical request decides nothing and is not an error.
        let events = expense
            .handle(&ExpenseCommand::SettleSplit(settle(&expense, a, payer)))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(expense, state_after_first);
    }

    #[test]
    fn settle_rejects_non_payer() {
        let payer = UserId::new();
        let a = UserId::new();
        let b = UserId::new();
        let expense = recorded(payer, vec![(a, 500), (b, 500)]);

        let err = expense
            .handle(&ExpenseCommand::SettleSplit(settle(&expense, a, b)))
            .unwrap_err();
        assert_eq!(err, DomainError::NotAuthorized);
        assert!(!expense.split_for(a).unwrap().settled);
    }

    #[test]
    fn settle_rejects_unknown_participant() {
        let payer = UserId::new();
        let a = UserId::new();
        let expense = recorded(payer, vec![(a, 500)]);

        let err = expense
            .handle(&ExpenseCommand::SettleSplit(settle(
                &expense,
                UserId::new(),
                payer,
            )))
            .unwrap_err();
        assert_eq!(err, DomainError::ParticipantNotFound);
    }

    #[test]
    fn settle_rejects_missing_expense() {
        let expense = Expense::empty(ExpenseId::new(AggregateId::new()));
        let err = expense
            .handle(&ExpenseCommand::SettleSplit(SettleSplit {
                expense_id: expense.id_typed(),
                participant: UserId::new(),
                requester: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::ExpenseNotFound);
    }
}
