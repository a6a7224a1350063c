//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: Can be reconstructed from the event stream
//! - **Idempotent**: Safe for at-least-once delivery (per-stream cursors)
//!
//! `balances` is not a projection in the storage sense: it derives pairwise
//! and group balances on demand from the expense and group read models and
//! never holds state of its own.

pub mod balances;
pub mod expenses;
pub mod groups;

pub use balances::{BalanceAggregator, GroupBalanceReport, MemberBalance};
pub use expenses::{ExpenseFilter, ExpenseProjectionError, ExpenseRecord, ExpensesProjection};
pub use groups::{GroupProjectionError, GroupRecord, GroupsProjection};
