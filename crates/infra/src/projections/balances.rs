//! Balance aggregation: who owes whom, how much.
//!
//! Balances are a pure projection over live expense records; nothing here
//! writes or caches. Positive = counterpart owes the subject; negative =
//! subject owes the counterpart. Balances are only meaningful within one
//! currency, so every result is a per-currency map and currencies are never
//! summed together or converted.

use std::collections::BTreeMap;
use std::sync::Arc;

use fairshare_core::{Currency, DomainError, DomainResult, UserId};
use fairshare_expenses::ExpenseId;
use fairshare_groups::GroupId;

use crate::projections::expenses::{ExpenseFilter, ExpenseRecord, ExpensesProjection};
use crate::projections::groups::{GroupRecord, GroupsProjection};
use crate::read_model::ReadModelStore;

/// Net position of one group member, per currency (zero entries omitted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberBalance {
    pub user_id: UserId,
    /// The user is referenced by group expenses but no longer on the roster.
    /// Their amounts are reported, never dropped.
    pub stale: bool,
    pub net: BTreeMap<Currency, i64>,
}

/// Group-wide balance report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBalanceReport {
    pub group_id: GroupId,
    pub members: Vec<MemberBalance>,
    /// Sum of group expense totals, per currency.
    pub totals_by_currency: BTreeMap<Currency, i64>,
}

/// Net pairwise balance between `subject` and `counterpart`, per currency.
///
/// Only unsettled splits contribute; a payer's own convenience split is
/// created settled and therefore never contributes. Zero entries are
/// omitted, so "settled up" is an empty map.
pub fn pairwise_balance<'a>(
    expenses: impl IntoIterator<Item = &'a ExpenseRecord>,
    subject: UserId,
    counterpart: UserId,
) -> BTreeMap<Currency, i64> {
    let mut net: BTreeMap<Currency, i64> = BTreeMap::new();
    if subject == counterpart {
        return net;
    }

    for expense in expenses {
        if expense.payer == subject {
            for split in &expense.splits {
                if split.user_id == counterpart && !split.settled {
                    let entry = net.entry(split.amount.currency()).or_insert(0);
                    *entry = entry.saturating_add(split.amount.minor_units());
                }
            }
        } else if expense.payer == counterpart {
            for split in &expense.splits {
                if split.user_id == subject && !split.settled {
                    let entry = net.entry(split.amount.currency()).or_insert(0);
                    *entry = entry.saturating_sub(split.amount.minor_units());
                }
            }
        }
    }

    net.retain(|_, v| *v != 0);
    net
}

/// Group balance report over the group's expense records.
///
/// `expenses` must already be restricted to the group. Roster members are
/// always listed (an empty net means settled up); users referenced by splits
/// but missing from the roster are appended flagged `stale`.
pub fn group_balance<'a>(
    group: &GroupRecord,
    expenses: impl IntoIterator<Item = &'a ExpenseRecord>,
) -> GroupBalanceReport {
    let mut totals: BTreeMap<Currency, i64> = BTreeMap::new();
    let mut nets: BTreeMap<UserId, BTreeMap<Currency, i64>> = BTreeMap::new();

    for expense in expenses {
        let total_entry = totals.entry(expense.amount.currency()).or_insert(0);
        *total_entry = total_entry.saturating_add(expense.amount.minor_units());

        for split in &expense.splits {
            if split.settled || split.user_id == expense.payer {
                continue;
            }
            let currency = split.amount.currency();
            let minor = split.amount.minor_units();

            let debtor = nets.entry(split.user_id).or_default().entry(currency).or_insert(0);
            *debtor = debtor.saturating_sub(minor);
            let creditor = nets.entry(expense.payer).or_default().entry(currency).or_insert(0);
            *creditor = creditor.saturating_add(minor);
        }
    }

    let mut members = Vec::with_capacity(group.members.len());
    for membership in &group.members {
        let mut net = nets.remove(&membership.user_id).unwrap_or_default();
        net.retain(|_, v| *v != 0);
        members.push(MemberBalance {
            user_id: membership.user_id,
            stale: false,
            net,
        });
    }

    // Whatever is left belongs to users who were removed from the roster
    // after participating. Keep the accounting trail.
    for (user_id, mut net) in nets {
        net.retain(|_, v| *v != 0);
        if net.is_empty() {
            continue;
        }
        members.push(MemberBalance {
            user_id,
            stale: true,
            net,
        });
    }

    GroupBalanceReport {
        group_id: group.group_id,
        members,
        totals_by_currency: totals,
    }
}

/// Read-side facade over the expense and group read models.
///
/// Holds no state of its own; every query folds over a fresh snapshot and is
/// safe to retry and to run concurrently with writers.
#[derive(Debug)]
pub struct BalanceAggregator<SE, SG>
where
    SE: ReadModelStore<ExpenseId, ExpenseRecord>,
    SG: ReadModelStore<GroupId, GroupRecord>,
{
    expenses: Arc<ExpensesProjection<SE>>,
    groups: Arc<GroupsProjection<SG>>,
}

impl<SE, SG> BalanceAggregator<SE, SG>
where
    SE: ReadModelStore<ExpenseId, ExpenseRecord>,
    SG: ReadModelStore<GroupId, GroupRecord>,
{
    pub fn new(expenses: Arc<ExpensesProjection<SE>>, groups: Arc<GroupsProjection<SG>>) -> Self {
        Self { expenses, groups }
    }

    /// Pairwise balance between two users, per currency.
    pub fn pairwise(&self, subject: UserId, counterpart: UserId) -> BTreeMap<Currency, i64> {
        let records = self.expenses.list_filtered(&ExpenseFilter {
            counterpart: Some(subject),
            ..Default::default()
        });
        pairwise_balance(records.iter(), subject, counterpart)
    }

    /// Balance report for a group.
    pub fn for_group(&self, group_id: GroupId) -> DomainResult<GroupBalanceReport> {
        let group = self
            .groups
            .get(&group_id)
            .ok_or(DomainError::GroupNotFound)?;
        let records = self.expenses.list_filtered(&ExpenseFilter {
            group_id: Some(group_id),
            ..Default::default()
        });
        Ok(group_balance(&group, records.iter()))
    }
}
