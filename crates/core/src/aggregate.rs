//! Event-sourced aggregate contract.

/// A consistency boundary rebuilt from its event stream.
///
/// One trait covers both halves of an aggregate's job:
///
/// - `handle` is the decision side. Given current state and a command it
///   returns the events that should happen, or a domain error. It never
///   mutates and never touches IO. Returning an empty event list means the
///   command is a no-op in this state, which is how idempotent retries fall
///   out for free.
/// - `apply` is the evolution side. It folds one event into state and must be
///   deterministic, because the same fold runs on every rehydration.
///
/// `version` counts applied events and is what optimistic concurrency checks
/// against.
pub trait Aggregate {
    /// Strongly-typed identifier for this aggregate family.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far (0 for a fresh instance).
    fn version(&self) -> u64;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

/// What a writer believes the stream version to be at append time.
///
/// `Exact(n)` is the compare-and-set arm of optimistic concurrency: the
/// append commits only if the stream is still at `n`. `Any` opts out, for
/// callers that genuinely do not care who raced them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    /// Whether a stream currently at `actual` satisfies this expectation.
    pub fn is_met_by(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(expected) => expected == actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_expectation_only_matches_its_own_version() {
        assert!(ExpectedVersion::Exact(3).is_met_by(3));
        assert!(!ExpectedVersion::Exact(3).is_met_by(2));
        assert!(!ExpectedVersion::Exact(3).is_met_by(4));
    }

    #[test]
    fn any_expectation_always_matches() {
        assert!(ExpectedVersion::Any.is_met_by(0));
        assert!(ExpectedVersion::Any.is_met_by(u64::MAX));
    }
}
