//! Group roster read model projection.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use fairshare_core::{AggregateId, UserId};
use fairshare_events::EventEnvelope;
use fairshare_groups::{GroupEvent, GroupId, GroupRole, Membership};

use crate::read_model::ReadModelStore;

/// Aggregate type tag for group streams.
pub const GROUP_AGGREGATE_TYPE: &str = "groups.group";

/// Queryable group record (header + roster).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub group_id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub created_by: UserId,
    pub members: Vec<Membership>,
}

impl GroupRecord {
    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    /// Creator-is-always-admin rule, mirrored from the aggregate.
    pub fn is_admin(&self, user_id: UserId) -> bool {
        user_id == self.created_by
            || self
                .members
                .iter()
                .any(|m| m.user_id == user_id && m.role == GroupRole::Admin)
    }
}

#[derive(Debug, Error)]
pub enum GroupProjectionError {
    #[error("failed to deserialize group event: {0}")]
    Deserialize(String),

    #[error("event group_id does not match envelope aggregate_id: {0}")]
    AggregateMismatch(String),

    #[error("no record for group {0} (projection out of sync)")]
    MissingRecord(GroupId),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Groups projection: builds [`GroupRecord`]s from group events.
#[derive(Debug)]
pub struct GroupsProjection<S>
where
    S: ReadModelStore<GroupId, GroupRecord>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> GroupsProjection<S>
where
    S: ReadModelStore<GroupId, GroupRecord>,
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

    pub fn get(&self, group_id: &GroupId) -> Option<GroupRecord> {
        self.store.get(group_id)
    }

    pub fn list(&self) -> Vec<GroupRecord> {
        let mut records = self.store.list();
        records.sort_by_key(|r| r.group_id.0.as_uuid().as_u128());
        records
    }

    /// Apply an envelope into the read model.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), GroupProjectionError> {
        if envelope.aggregate_type != GROUP_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id;
        let seq = envelope.sequence_number;

        let last = self.get_cursor(aggregate_id);
        if seq == 0 {
            return Err(GroupProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(GroupProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: GroupEvent = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| GroupProjectionError::Deserialize(e.to_string()))?;

        let group_id = match &ev {
            GroupEvent::GroupCreated(e) => e.group_id,
            GroupEvent::MemberJoined(e) => e.group_id,
            GroupEvent::MemberLeft(e) => e.group_id,
            GroupEvent::MemberAdded(e) => e.group_id,
            GroupEvent::MemberRemoved(e) => e.group_id,
        };
        if group_id.0 != aggregate_id {
            return Err(GroupProjectionError::AggregateMismatch(group_id.to_string()));
        }

        match ev {
            GroupEvent::GroupCreated(e) => {
                self.store.upsert(
                    e.group_id,
                    GroupRecord {
                        group_id: e.group_id,
                        name: e.name,
                        description: e.description,
                        created_by: e.creator,
                        members: e.members,
                    },
                );
            }
            GroupEvent::MemberJoined(e) => {
                let mut rm = self
                    .store
                    .get(&e.group_id)
                    .ok_or(GroupProjectionError::MissingRecord(e.group_id))?;
                rm.members.push(Membership {
                    user_id: e.user_id,
                    role: GroupRole::Member,
                    added_at: e.occurred_at,
                });
                self.store.upsert(e.group_id, rm);
            }
            GroupEvent::MemberLeft(e) => {
                let mut rm = self
                    .store
                    .get(&e.group_id)
                    .ok_or(GroupProjectionError::MissingRecord(e.group_id))?;
                rm.members.retain(|m| m.user_id != e.user_id);
                self.store.upsert(e.group_id, rm);
            }
            GroupEvent::MemberAdded(e) => {
                let mut rm = self
                    .store
                    .get(&e.group_id)
                    .ok_or(GroupProjectionError::MissingRecord(e.group_id))?;
                rm.members.push(Membership {
                    user_id: e.member_id,
                    role: GroupRole::Member,
                    added_at: e.occurred_at,
                });
                self.store.upsert(e.group_id, rm);
            }
            GroupEvent::MemberRemoved(e) => {
                let mut rm = self
                    .store
                    .get(&e.group_id)
                    .ok_or(GroupProjectionError::MissingRecord(e.group_id))?;
                rm.members.retain(|m| m.user_id != e.member_id);
                self.store.upsert(e.group_id, rm);
            }
        }

        self.update_cursor(aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read model from scratch.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), GroupProjectionError> {
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
