use fairshare_core::UserId;

/// Caller context for a request.
///
/// The engine never guesses who is acting: every mutating operation takes the
/// caller identity from here, and authorization (payer-only, admin-only)
/// depends on it. Authentication itself happens upstream; this layer only
/// consumes the already-established identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CallerContext {
    user_id: UserId,
}

impl CallerContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}
