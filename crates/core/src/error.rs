//! Domain error model.

use thiserror::Error;

use crate::id::UserId;
use crate::money::Currency;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, authorization, not-found). Infrastructure concerns belong
/// elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Split amounts do not sum to the expense total (minor units).
    #[error("split amounts sum to {actual} minor units, expected {expected}")]
    InvalidSplitSum { expected: i64, actual: i64 },

    /// An expense was submitted without any splits.
    #[error("expense must have at least one split")]
    EmptySplitSet,

    /// The same participant appears in more than one split.
    #[error("participant {0} appears more than once in the split set")]
    DuplicateParticipant(UserId),

    /// An expense amount must be strictly positive.
    #[error("amount must be positive")]
    NonPositiveAmount,

    /// Two money values in different currencies were combined.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    /// The requester is not allowed to perform this operation.
    #[error("not authorized")]
    NotAuthorized,

    /// The referenced expense does not exist (or was deleted).
    #[error("expense not found")]
    ExpenseNotFound,

    /// The referenced group does not exist.
    #[error("group not found")]
    GroupNotFound,

    /// The expense has no split for the referenced participant.
    #[error("participant not found on expense")]
    ParticipantNotFound,

    /// The user is already a member of the group.
    #[error("already a member")]
    AlreadyMember,

    /// The user is not a member of the group.
    #[error("not a member")]
    NotAMember,

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
