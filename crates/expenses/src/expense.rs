use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fairshare_core::{Aggregate, AggregateId, Currency, DomainError, Money, UserId};
use fairshare_events::Event;
use fairshare_groups::GroupId;

use crate::settlement::{SettleSplit, SplitSettled};

/// Expense identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(pub AggregateId);

impl ExpenseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Expense category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseCategory {
    General,
    Food,
    Rent,
    Transport,
    Utilities,
    Entertainment,
    Trip,
}

/// One participant's share of an expense.
///
/// A split whose user is the expense's payer is a bookkeeping convenience and
/// is always created pre-settled (a payer cannot owe themselves).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub user_id: UserId,
    pub amount: Money,
    pub settled: bool,
}

/// Command-side split: the `settled` flag is derived by the aggregate, never
/// supplied by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitInput {
    pub user_id: UserId,
    pub amount: Money,
}

/// Aggregate root: Expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expense {
    id: ExpenseId,
    payer: UserId,
    description: String,
    amount: Money,
    category: ExpenseCategory,
    incurred_on: DateTime<Utc>,
    group_id: Option<GroupId>,
    splits: Vec<Split>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Expense {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ExpenseId) -> Self {
        // Placeholder values until ExpenseRecorded is applied.
        Self {
            id,
            payer: UserId::from_uuid(uuid::Uuid::nil()),
            description: String::new(),
            amount: Money::zero(Currency::XXX),
            category: ExpenseCategory::General,
            incurred_on: DateTime::<Utc>::UNIX_EPOCH,
            group_id: None,
            splits: Vec::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ExpenseId {
        self.id
    }

    pub fn payer(&self) -> UserId {
        self.payer
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn category(&self) -> ExpenseCategory {
        self.category
    }

    pub fn incurred_on(&self) -> DateTime<Utc> {
        self.incurred_on
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.group_id
    }

    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn split_for(&self, user_id: UserId) -> Option<&Split> {
        self.splits.iter().find(|s| s.user_id == user_id)
    }

    /// Whether every non-payer split is settled.
    ///
    /// The payer's own convenience split is pre-settled and excluded here.
    pub fn is_settled(&self) -> bool {
        self.splits
            .iter()
            .filter(|s| s.user_id != self.payer)
            .all(|s| s.settled)
    }

    pub(crate) fn exists(&self) -> bool {
        self.created && !self.deleted
    }
}

/// Command: RecordExpense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordExpense {
    pub expense_id: ExpenseId,
    pub payer: UserId,
    pub description: String,
    pub amount: Money,
    pub category: ExpenseCategory,
    pub incurred_on: DateTime<Utc>,
    pub group_id: Option<GroupId>,
    pub splits: Vec<SplitInput>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseExpense (payer-only partial update).
///
/// If `amount` or `splits` is present, the *effective* amount and split set
/// (patched value, or current value where the patch is `None`) must satisfy
/// the sum invariant again. Settlement carry-over: a participant retained
/// with an unchanged amount keeps their settled flag; removed or
/// amount-changed participants lose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseExpense {
    pub expense_id: ExpenseId,
    pub requester: UserId,
    pub description: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub incurred_on: Option<DateTime<Utc>>,
    pub amount: Option<Money>,
    pub splits: Option<Vec<SplitInput>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveExpense (payer-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveExpense {
    pub expense_id: ExpenseId,
    pub requester: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseCommand {
    RecordExpense(RecordExpense),
    ReviseExpense(ReviseExpense),
    RemoveExpense(RemoveExpense),
    SettleSplit(SettleSplit),
}

/// Event: ExpenseRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecorded {
    pub expense_id: ExpenseId,
    pub payer: UserId,
    pub description: String,
    pub amount: Money,
    pub category: ExpenseCategory,
    pub incurred_on: DateTime<Utc>,
    pub group_id: Option<GroupId>,
    /// Splits with `settled` already derived (payer self-split pre-settled).
    pub splits: Vec<Split>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExpenseRevised (carries the full new value of every mutable field).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRevised {
    pub expense_id: ExpenseId,
    pub description: String,
    pub amount: Money,
    pub category: ExpenseCategory,
    pub incurred_on: DateTime<Utc>,
    pub splits: Vec<Split>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExpenseRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRemoved {
    pub expense_id: ExpenseId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpenseEvent {
    ExpenseRecorded(ExpenseRecorded),
    ExpenseRevised(ExpenseRevised),
    ExpenseRemoved(ExpenseRemoved),
    SplitSettled(SplitSettled),
}

impl Event for ExpenseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ExpenseEvent::ExpenseRecorded(_) => "expenses.expense.recorded",
            ExpenseEvent::ExpenseRevised(_) => "expenses.expense.revised",
            ExpenseEvent::ExpenseRemoved(_) => "expenses.expense.removed",
            ExpenseEvent::SplitSettled(_) => "expenses.expense.split_settled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ExpenseEvent::ExpenseRecorded(e) => e.occurred_at,
            ExpenseEvent::ExpenseRevised(e) => e.occurred_at,
            ExpenseEvent::ExpenseRemoved(e) => e.occurred_at,
            ExpenseEvent::SplitSettled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Expense {
    type Id = ExpenseId;
    type Command = ExpenseCommand;
    type Event = ExpenseEvent;
    type Error = DomainError;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ExpenseEvent::ExpenseRecorded(e) => {
                self.id = e.expense_id;
                self.payer = e.payer;
                self.description = e.description.clone();
                self.amount = e.amount;
                self.category = e.category;
                self.incurred_on = e.incurred_on;
                self.group_id = e.group_id;
                self.splits = e.splits.clone();
                self.created_at = e.occurred_at;
                self.updated_at = e.occurred_at;
                self.deleted = false;
                self.created = true;
            }
            ExpenseEvent::ExpenseRevised(e) => {
                self.description = e.description.clone();
                self.amount = e.amount;
                self.category = e.category;
                self.incurred_on = e.incurred_on;
                self.splits = e.splits.clone();
                self.updated_at = e.occurred_at;
            }
            ExpenseEvent::ExpenseRemoved(_) => {
                self.deleted = true;
            }
            ExpenseEvent::SplitSettled(e) => {
                if let Some(split) = self.splits.iter_mut().find(|s| s.user_id == e.participant) {
                    split.settled = true;
                }
                self.updated_at = e.occurred_at;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ExpenseCommand::RecordExpense(cmd) => self.handle_record(cmd),
            ExpenseCommand::ReviseExpense(cmd) => self.handle_revise(cmd),
            ExpenseCommand::RemoveExpense(cmd) => self.handle_remove(cmd),
            ExpenseCommand::SettleSplit(cmd) => self.handle_settle(cmd),
        }
    }
}

impl Expense {
    pub(crate) fn ensure_expense_id(&self, expense_id: ExpenseId) -> Result<(), DomainError> {
        if self.id != expense_id {
            return Err(DomainError::conflict("expense_id mismatch"));
        }
        Ok(())
    }

    pub(crate) fn ensure_payer(&self, requester: UserId) -> Result<(), DomainError> {
        if requester != self.payer {
            return Err(DomainError::NotAuthorized);
        }
        Ok(())
    }

    /// Validate a replacement split set against `amount` and derive `settled`
    /// flags. `previous` is the split set being replaced (empty on creation).
    fn validate_splits(
        payer: UserId,
        amount: Money,
        inputs: &[SplitInput],
        previous: &[Split],
    ) -> Result<Vec<Split>, DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::NonPositiveAmount);
        }
        if inputs.is_empty() {
            return Err(DomainError::EmptySplitSet);
        }

        let mut total: i64 = 0;
        let mut splits = Vec::with_capacity(inputs.len());
        for input in inputs {
            if splits
                .iter()
                .any(|s: &Split| s.user_id == input.user_id)
            {
                return Err(DomainError::DuplicateParticipant(input.user_id));
            }
            amount.ensure_same_currency(&input.amount)?;
            if input.amount.is_negative() {
                return Err(DomainError::validation("split amount cannot be negative"));
            }
            total = total
                .checked_add(input.amount.minor_units())
                .ok_or_else(|| DomainError::validation("split sum overflow"))?;

            // Carry-over: the payer's own split is always settled; anyone
            // else keeps their flag only if retained with an unchanged amount.
            let settled = input.user_id == payer
                || previous
                    .iter()
                    .any(|p| p.user_id == input.user_id && p.amount == input.amount && p.settled);
            splits.push(Split {
                user_id: input.user_id,
                amount: input.amount,
                settled,
            });
        }

        if total != amount.minor_units() {
            return Err(DomainError::InvalidSplitSum {
                expected: amount.minor_units(),
                actual: total,
            });
        }

        Ok(splits)
    }

    fn handle_record(&self, cmd: &RecordExpense) -> Result<Vec<ExpenseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("expense already exists"));
        }

        if cmd.description.trim().is_empty() {
            return Err(DomainError::validation("description cannot be empty"));
        }

        let splits = Self::validate_splits(cmd.payer, cmd.amount, &cmd.splits, &[])?;

        Ok(vec![ExpenseEvent::ExpenseRecorded(ExpenseRecorded {
            expense_id: cmd.expense_id,
            payer: cmd.payer,
            description: cmd.description.clone(),
            amount: cmd.amount,
            category: cmd.category,
            incurred_on: cmd.incurred_on,
            group_id: cmd.group_id,
            splits,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseExpense) -> Result<Vec<ExpenseEvent>, DomainError> {
        if !self.exists() {
            return Err(DomainError::ExpenseNotFound);
        }
        self.ensure_expense_id(cmd.expense_id)?;
        self.ensure_payer(cmd.requester)?;

        let description = cmd
            .description
            .clone()
            .unwrap_or_else(|| self.description.clone());
        if description.trim().is_empty() {
            return Err(DomainError::validation("description cannot be empty"));
        }

        let amount = cmd.amount.unwrap_or(self.amount);
        let splits = if cmd.amount.is_some() || cmd.splits.is_some() {
            let inputs: Vec<SplitInput> = match &cmd.splits {
                Some(inputs) => inputs.clone(),
                None => self
                    .splits
                    .iter()
                    .map(|s| SplitInput {
                        user_id: s.user_id,
                        amount: s.amount,
                    })
                    .collect(),
            };
            Self::validate_splits(self.payer, amount, &inputs, &self.splits)?
        } else {
            self.splits.clone()
        };

        Ok(vec![ExpenseEvent::ExpenseRevised(ExpenseRevised {
            expense_id: cmd.expense_id,
            description,
            amount,
            category: cmd.category.unwrap_or(self.category),
            incurred_on: cmd.incurred_on.unwrap_or(self.incurred_on),
            splits,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveExpense) -> Result<Vec<ExpenseEvent>, DomainError> {
        if !self.exists() {
            return Err(DomainError::ExpenseNotFound);
        }
        self.ensure_expense_id(cmd.expense_id)?;
        self.ensure_payer(cmd.requester)?;

        Ok(vec![ExpenseEvent::ExpenseRemoved(ExpenseRemoved {
            expense_id: cmd.expense_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
