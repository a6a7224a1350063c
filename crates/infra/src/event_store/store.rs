//! Event persistence records and the store contract.
//!
//! An event crosses three shapes on its way to a reader: the typed domain
//! event (decided by an aggregate), an [`UncommittedEvent`] (serialized, not
//! yet positioned), and a [`StoredEvent`] (positioned in its stream). The
//! envelope published to the bus is derived from the stored form, never from
//! the uncommitted one, so subscribers only ever see durable history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use fairshare_core::{AggregateId, ExpectedVersion};
use fairshare_events::{Event, EventEnvelope};

#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The stream moved past the version the writer loaded. Retryable: reload
    /// and re-decide.
    #[error("stream version check failed: {0}")]
    Concurrency(String),

    /// An append would mix aggregate types within one stream.
    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    /// The batch itself is malformed (mixed streams, unserializable payload).
    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// A serialized event awaiting its stream position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl UncommittedEvent {
    /// Serialize a typed domain event for appending.
    ///
    /// Captures the event's own metadata (type name, schema version, business
    /// time) so the payload can be decoded again without guessing.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// A durable event, positioned in its stream.
///
/// `sequence_number` starts at 1 and increases by exactly one per event; it
/// is assigned once at append time and doubles as the stream version for
/// optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    /// The bus-facing form of this event.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope {
            event_id: self.event_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type.clone(),
            sequence_number: self.sequence_number,
            event_type: self.event_type.clone(),
            occurred_at: self.occurred_at,
            payload: self.payload.clone(),
        }
    }
}

/// Append-only store of per-aggregate event streams.
///
/// One stream per aggregate instance, keyed by [`AggregateId`]. An
/// implementation must make `append` atomic (the whole batch or nothing),
/// refuse it when `expected_version` no longer holds, and hand back streams
/// in sequence order from `load_stream`. Nothing is ever rewritten or
/// deleted; a "deleted" aggregate is one whose stream ends in a removal
/// event.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Full history for one aggregate; empty if the stream does not exist.
    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(aggregate_id)
    }
}
