use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use fairshare_core::{Aggregate, AggregateId, Currency, DomainError, DomainResult, UserId};
use fairshare_events::{EventBus, EventEnvelope, InMemoryEventBus};
use fairshare_expenses::{Expense, ExpenseEvent, ExpenseId};
use fairshare_groups::{Group, GroupEvent, GroupId};
use fairshare_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use fairshare_infra::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use fairshare_infra::projections::balances::{BalanceAggregator, GroupBalanceReport};
use fairshare_infra::projections::expenses::{
    EXPENSE_AGGREGATE_TYPE, ExpenseFilter, ExpenseRecord, ExpensesProjection,
};
use fairshare_infra::projections::groups::{GROUP_AGGREGATE_TYPE, GroupRecord, GroupsProjection};
use fairshare_infra::read_model::InMemoryReadModelStore;

type ExpensesStore = Arc<InMemoryReadModelStore<ExpenseId, ExpenseRecord>>;
type GroupsStore = Arc<InMemoryReadModelStore<GroupId, GroupRecord>>;

type InMemoryDispatcher =
    CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

/// Application services: dispatcher + projections behind one handle.
///
/// The write path is command → dispatcher → store/bus; the read path is
/// projection lookups. Projections catch up asynchronously off the bus, so
/// reads are eventually consistent; mutation responses that need
/// read-your-writes use the `*_snapshot` accessors, which rehydrate straight
/// from the event store.
pub struct AppServices {
    dispatcher: InMemoryDispatcher,
    event_store: Arc<InMemoryEventStore>,
    expenses_projection: Arc<ExpensesProjection<ExpensesStore>>,
    groups_projection: Arc<GroupsProjection<GroupsStore>>,
    aggregator: BalanceAggregator<ExpensesStore, GroupsStore>,
}

/// In-memory infra wiring: store + bus + projections + background subscriber.
pub fn build_services() -> AppServices {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());

    let expenses_projection: Arc<ExpensesProjection<ExpensesStore>> = Arc::new(
        ExpensesProjection::new(Arc::new(InMemoryReadModelStore::new())),
    );
    let groups_projection: Arc<GroupsProjection<GroupsStore>> = Arc::new(GroupsProjection::new(
        Arc::new(InMemoryReadModelStore::new()),
    ));
    let aggregator =
        BalanceAggregator::new(expenses_projection.clone(), groups_projection.clone());

    // Background subscriber: bus -> projections.
    {
        let sub = bus.subscribe();
        let expenses_projection = expenses_projection.clone();
        let groups_projection = groups_projection.clone();
        tokio::task::spawn_blocking(move || {
            loop {
                match sub.recv() {
                    Ok(env) => {
                        let apply_ok = match env.aggregate_type.as_str() {
                            EXPENSE_AGGREGATE_TYPE => expenses_projection
                                .apply_envelope(&env)
                                .map_err(|e| e.to_string()),
                            GROUP_AGGREGATE_TYPE => groups_projection
                                .apply_envelope(&env)
                                .map_err(|e| e.to_string()),
                            _ => Ok(()),
                        };

                        if let Err(e) = apply_ok {
                            tracing::warn!("projection apply failed: {e}");
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    let dispatcher = CommandDispatcher::new(store.clone(), bus);
    AppServices {
        dispatcher,
        event_store: store,
        expenses_projection,
        groups_projection,
        aggregator,
    }
}

impl AppServices {
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: fairshare_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        self.dispatcher
            .dispatch::<A>(aggregate_id, aggregate_type, command, make_aggregate)
    }

    pub fn expenses_get(&self, expense_id: &ExpenseId) -> Option<ExpenseRecord> {
        self.expenses_projection.get(expense_id)
    }

    pub fn expenses_list(&self, filter: &ExpenseFilter) -> Vec<ExpenseRecord> {
        self.expenses_projection.list_filtered(filter)
    }

    pub fn groups_get(&self, group_id: &GroupId) -> Option<GroupRecord> {
        self.groups_projection.get(group_id)
    }

    pub fn pairwise_balance(
        &self,
        subject: UserId,
        counterpart: UserId,
    ) -> BTreeMap<Currency, i64> {
        self.aggregator.pairwise(subject, counterpart)
    }

    pub fn group_balance(&self, group_id: GroupId) -> DomainResult<GroupBalanceReport> {
        self.aggregator.for_group(group_id)
    }

    /// Authoritative expense record straight from the event store
    /// (read-your-writes for mutation responses).
    pub fn expense_snapshot(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Option<ExpenseRecord>, DispatchError> {
        let mut stream = self.event_store.load_stream(expense_id.0)?;
        if stream.is_empty() {
            return Ok(None);
        }
        stream.sort_by_key(|e| e.sequence_number);

        let mut expense = Expense::empty(expense_id);
        for stored in stream {
            let ev: ExpenseEvent = serde_json::from_value(stored.payload)
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            expense.apply(&ev);
        }
        if expense.is_deleted() {
            return Ok(None);
        }

        Ok(Some(ExpenseRecord {
            expense_id: expense.id_typed(),
            payer: expense.payer(),
            description: expense.description().to_string(),
            amount: expense.amount(),
            category: expense.category(),
            incurred_on: expense.incurred_on(),
            group_id: expense.group_id(),
            splits: expense.splits().to_vec(),
            settled: expense.is_settled(),
            created_at: expense.created_at(),
            updated_at: expense.updated_at(),
        }))
    }

    /// Authoritative group record straight from the event store.
    pub fn group_snapshot(&self, group_id: GroupId) -> Result<Option<GroupRecord>, DispatchError> {
        let mut stream = self.event_store.load_stream(group_id.0)?;
        if stream.is_empty() {
            return Ok(None);
        }
        stream.sort_by_key(|e| e.sequence_number);

        let mut group = Group::empty(group_id);
        for stored in stream {
            let ev: GroupEvent = serde_json::from_value(stored.payload)
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            group.apply(&ev);
        }

        Ok(Some(GroupRecord {
            group_id: group.id_typed(),
            name: group.name().to_string(),
            description: group.description().map(str::to_string),
            created_by: group.created_by(),
            members: group.members().to_vec(),
        }))
    }
}
