use chrono::{DateTime, Utc};

/// Contract every typed domain event satisfies.
///
/// An event is a fact: once decided it is never edited, only appended after.
/// The accessors here are the metadata the infrastructure needs to store and
/// route an event without understanding its payload.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable name under which this event is persisted, e.g.
    /// `expenses.expense.recorded`. Renaming one is a schema migration.
    fn event_type(&self) -> &'static str;

    /// Payload schema version, bumped when the serialized shape changes.
    fn version(&self) -> u32;

    /// Business time: when the thing described actually happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}
