//! Map-of-streams event store for tests and single-process runs.

use std::collections::HashMap;
use std::sync::RwLock;

use fairshare_core::{AggregateId, ExpectedVersion};

use super::store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// One aggregate's history plus the type it was opened with.
///
/// Pinning the type at stream creation is what lets the store reject a
/// group event appended onto an expense stream even when every batch is
/// internally consistent.
#[derive(Debug)]
struct Stream {
    kind: String,
    events: Vec<StoredEvent>,
}

impl Stream {
    fn opened(kind: String) -> Self {
        Self {
            kind,
            events: Vec::new(),
        }
    }

    fn version(&self) -> u64 {
        self.events.last().map_or(0, |e| e.sequence_number)
    }
}

/// In-memory [`EventStore`].
///
/// A single `RwLock` over the stream map makes every append atomic; the
/// version check and the push happen under one write guard, which is the
/// whole compare-and-set.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<AggregateId, Stream>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(Vec::new());
        };
        let aggregate_id = first.aggregate_id;
        let kind = first.aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch mixes aggregate ids (index {idx})"
                )));
            }
            if e.aggregate_type != kind {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch mixes aggregate types (index {idx})"
                )));
            }
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("store lock poisoned".to_string()))?;

        let stream = streams
            .entry(aggregate_id)
            .or_insert_with(|| Stream::opened(kind.clone()));
        if stream.kind != kind {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream is '{}', append carried '{}'",
                stream.kind, kind
            )));
        }

        let current = stream.version();
        if !expected_version.is_met_by(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, stream is at {current}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        for (offset, e) in events.into_iter().enumerate() {
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: current + 1 + offset as u64,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            stream.events.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("store lock poisoned".to_string()))?;

        Ok(streams
            .get(&aggregate_id)
            .map(|s| s.events.clone())
            .unwrap_or_default())
    }
}
