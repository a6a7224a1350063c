//! Expense read model projection.
//!
//! Maintains one queryable record per live expense. Deleted expenses are
//! dropped from the store, so they vanish from every subsequent query and
//! balance computation.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use fairshare_core::{AggregateId, Money, UserId};
use fairshare_events::EventEnvelope;
use fairshare_expenses::{ExpenseCategory, ExpenseEvent, ExpenseId, Split};
use fairshare_groups::GroupId;

use crate::read_model::ReadModelStore;

/// Aggregate type tag for expense streams.
pub const EXPENSE_AGGREGATE_TYPE: &str = "expenses.expense";

/// Queryable expense record (header + splits).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseRecord {
    pub expense_id: ExpenseId,
    pub payer: UserId,
    pub description: String,
    pub amount: Money,
    pub category: ExpenseCategory,
    pub incurred_on: DateTime<Utc>,
    pub group_id: Option<GroupId>,
    pub splits: Vec<Split>,
    /// Every non-payer split settled.
    pub settled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExpenseRecord {
    fn derive_settled(payer: UserId, splits: &[Split]) -> bool {
        splits
            .iter()
            .filter(|s| s.user_id != payer)
            .all(|s| s.settled)
    }

    /// Whether `user_id` participates in this expense (as payer or debtor).
    pub fn involves(&self, user_id: UserId) -> bool {
        self.payer == user_id || self.splits.iter().any(|s| s.user_id == user_id)
    }
}

/// Query filter for expense listings.
///
/// Listings are a fresh query per call; no cursor state is retained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseFilter {
    /// Only expenses booked against this group.
    pub group_id: Option<GroupId>,
    /// Only expenses involving this user (as payer or participant).
    pub counterpart: Option<UserId>,
    /// Only fully settled (`true`) or not fully settled (`false`) expenses.
    pub settled: Option<bool>,
}

impl ExpenseFilter {
    pub fn matches(&self, record: &ExpenseRecord) -> bool {
        if let Some(group_id) = self.group_id {
            if record.group_id != Some(group_id) {
                return false;
            }
        }
        if let Some(counterpart) = self.counterpart {
            if !record.involves(counterpart) {
                return false;
            }
        }
        if let Some(settled) = self.settled {
            if record.settled != settled {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Error)]
pub enum ExpenseProjectionError {
    #[error("failed to deserialize expense event: {0}")]
    Deserialize(String),

    #[error("event expense_id does not match envelope aggregate_id: {0}")]
    AggregateMismatch(String),

    #[error("no record for expense {0} (projection out of sync)")]
    MissingRecord(ExpenseId),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Expenses projection: builds [`ExpenseRecord`]s from expense events.
///
/// Rebuildable and idempotent (per-stream cursor; replays at or below the
/// cursor are skipped).
#[derive(Debug)]
pub struct ExpensesProjection<S>
where
    S: ReadModelStore<ExpenseId, ExpenseRecord>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> ExpensesProjection<S>
where
    S: ReadModelStore<ExpenseId, ExpenseRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn get_cursor(&self, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors.get(&aggregate_id).unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(aggregate_id, sequence_number);
        }
    }

    fn clear_cursors(&self) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
    }

    pub fn get(&self, expense_id: &ExpenseId) -> Option<ExpenseRecord> {
        self.store.get(expense_id)
    }

    pub fn list(&self) -> Vec<ExpenseRecord> {
        let mut records = self.store.list();
        records.sort_by_key(|r| (r.created_at, r.expense_id.0.as_uuid().as_u128()));
        records
    }

    pub fn list_filtered(&self, filter: &ExpenseFilter) -> Vec<ExpenseRecord> {
        self.list()
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect()
    }

    /// Apply an envelope into the read model.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ExpenseProjectionError> {
        if envelope.aggregate_type != EXPENSE_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id;
        let seq = envelope.sequence_number;

        let last = self.get_cursor(aggregate_id);
        if seq == 0 {
            return Err(ExpenseProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(ExpenseProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: ExpenseEvent = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| ExpenseProjectionError::Deserialize(e.to_string()))?;

        let expense_id = match &ev {
            ExpenseEvent::ExpenseRecorded(e) => e.expense_id,
            ExpenseEvent::ExpenseRevised(e) => e.expense_id,
            ExpenseEvent::ExpenseRemoved(e) => e.expense_id,
            ExpenseEvent::SplitSettled(e) => e.expense_id,
        };
        if expense_id.0 != aggregate_id {
            return Err(ExpenseProjectionError::AggregateMismatch(
                expense_id.to_string(),
            ));
        }

        match ev {
            ExpenseEvent::ExpenseRecorded(e) => {
                let settled = ExpenseRecord::derive_settled(e.payer, &e.splits);
                self.store.upsert(
                    e.expense_id,
                    ExpenseRecord {
                        expense_id: e.expense_id,
                        payer: e.payer,
                        description: e.description,
                        amount: e.amount,
                        category: e.category,
                        incurred_on: e.incurred_on,
                        group_id: e.group_id,
                        splits: e.splits,
                        settled,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            ExpenseEvent::ExpenseRevised(e) => {
                let mut rm = self
                    .store
                    .get(&e.expense_id)
                    .ok_or(ExpenseProjectionError::MissingRecord(e.expense_id))?;
                rm.description = e.description;
                rm.amount = e.amount;
                rm.category = e.category;
                rm.incurred_on = e.incurred_on;
                rm.splits = e.splits;
                rm.settled = ExpenseRecord::derive_settled(rm.payer, &rm.splits);
                rm.updated_at = e.occurred_at;
                self.store.upsert(e.expense_id, rm);
            }
            ExpenseEvent::ExpenseRemoved(e) => {
                self.store.remove(&e.expense_id);
            }
            ExpenseEvent::SplitSettled(e) => {
                let mut rm = self
                    .store
                    .get(&e.expense_id)
                    .ok_or(ExpenseProjectionError::MissingRecord(e.expense_id))?;
                if let Some(split) = rm.splits.iter_mut().find(|s| s.user_id == e.participant) {
                    split.settled = true;
                }
                rm.settled = ExpenseRecord::derive_settled(rm.payer, &rm.splits);
                rm.updated_at = e.occurred_at;
                self.store.upsert(e.expense_id, rm);
            }
        }

        self.update_cursor(aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read model from scratch.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ExpenseProjectionError> {
        self.store.clear();
        self.clear_cursors();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (e.aggregate_id, e.sequence_number));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
