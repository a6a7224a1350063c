//! Command execution pipeline.
//!
//! Every mutating operation funnels through [`CommandDispatcher::dispatch`]:
//! load the aggregate's history, fold it back into state, let the aggregate
//! decide events, append them with the stream version the writer loaded, and
//! publish what was committed.
//!
//! Two properties of that pipeline carry the engine's concurrency story:
//!
//! - The append expects exactly the version that was loaded. Two writers
//!   racing on one aggregate produce at most one commit; the loser gets a
//!   retryable [`DispatchError::Concurrency`] and no partial state.
//! - A decision of zero events ends the pipeline before the append. Commands
//!   that are no-ops against current state (settling an already-settled
//!   split) therefore commit nothing, publish nothing, and can be retried
//!   forever.
//!
//! Publication happens after the append. If it fails, the events are already
//! durable and delivery is at-least-once; projections tolerate the replay.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use fairshare_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use fairshare_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Another writer committed first; reload and retry.
    #[error("concurrent update: {0}")]
    Concurrency(String),

    /// Deterministic domain refusal (validation, authorization, not-found).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A stored payload no longer decodes into the aggregate's event type.
    #[error("stored event did not decode: {0}")]
    Deserialize(String),

    /// The event store refused the operation.
    #[error("event store: {0}")]
    Store(EventStoreError),

    /// Append succeeded but publication did not; events are durable and
    /// redelivery is the bus consumer's problem.
    #[error("publication after append failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Executes commands against event-sourced aggregates.
///
/// Generic over store and bus so the in-memory pair serves tests and a
/// durable pair can replace it without touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run one command through the full pipeline.
    ///
    /// `make_aggregate` supplies the blank instance history is folded into,
    /// e.g. `|id| Expense::empty(ExpenseId::new(id))`. The returned events
    /// are the committed ones; an empty vector means the command changed
    /// nothing.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: fairshare_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        let mut aggregate = make_aggregate(aggregate_id);
        let loaded_version = rehydrate(&mut aggregate, aggregate_id, &history)?;

        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(Vec::new());
        }

        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self
            .store
            .append(uncommitted, ExpectedVersion::Exact(loaded_version))?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

/// Fold a loaded stream into a blank aggregate, returning the stream version.
///
/// Validation and application run in one pass: every event must belong to the
/// requested aggregate and carry the next sequence number. A backend handing
/// back someone else's stream, a gap, or an out-of-order batch is a hard
/// error, not something to sort around.
fn rehydrate<A>(
    aggregate: &mut A,
    aggregate_id: AggregateId,
    history: &[StoredEvent],
) -> Result<u64, DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let mut version = 0u64;
    for stored in history {
        if stored.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!(
                    "loaded stream for {aggregate_id} contains event for {}",
                    stored.aggregate_id
                ),
            )));
        }
        if stored.sequence_number != version + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!(
                    "stream out of order: expected sequence {}, found {}",
                    version + 1,
                    stored.sequence_number
                ),
            )));
        }

        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
        version = stored.sequence_number;
    }

    Ok(version)
}
