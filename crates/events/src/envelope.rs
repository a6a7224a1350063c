use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fairshare_core::AggregateId;

/// A committed event as handed to read-model builders.
///
/// Envelopes are produced from events that are already durable in their
/// stream, so consumers may treat `sequence_number` as authoritative: it is
/// the stream position assigned at append time, and redelivering the same
/// envelope carries the same number. `event_type` and `occurred_at` travel
/// alongside the payload so consumers can route and order without decoding
/// `payload` first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    /// Stream family, e.g. `expenses.expense`.
    pub aggregate_type: String,
    /// Position within the aggregate stream, starting at 1.
    pub sequence_number: u64,
    /// Stable event name, e.g. `expenses.expense.recorded`.
    pub event_type: String,
    /// Business time of the underlying event.
    pub occurred_at: DateTime<Utc>,
    pub payload: E,
}
