//! `fairshare-expenses`: expense ledger: expenses, splits, and settlement.
//!
//! The [`Expense`] aggregate owns the split-sum invariant (split amounts sum
//! exactly to the expense total, in the expense's currency) and the
//! payer-only authorization rules. The settlement state machine lives in
//! [`settlement`]: a split's `settled` flag only ever transitions
//! `false → true`, and only through [`settlement::SettleSplit`].

pub mod expense;
pub mod settlement;

pub use expense::{
    Expense, ExpenseCategory, ExpenseCommand, ExpenseEvent, ExpenseId, ExpenseRecorded,
    ExpenseRemoved, ExpenseRevised, RecordExpense, RemoveExpense, ReviseExpense, Split, SplitInput,
};
pub use settlement::{SettleSplit, SplitSettled};
