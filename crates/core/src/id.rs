//! Strongly-typed identifiers.
//!
//! Every identifier is a UUID newtype so a user id can never be passed where
//! a stream id belongs. Fresh ids are UUIDv7 and therefore time-ordered,
//! which keeps index locality reasonable in any backing store.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a fresh, time-ordered identifier.
            ///
            /// Tests that need determinism should construct ids from fixed
            /// UUIDs instead.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self).map_err(|_| {
                    DomainError::invalid_id(format!(
                        concat!("not a valid ", stringify!($name), ": {}"),
                        s
                    ))
                })
            }
        }
    };
}

uuid_id! {
    /// Identity of an acting user. Minted and owned by the external account
    /// system; this engine only ever references it.
    UserId
}

uuid_id! {
    /// Identity of one event stream (a single expense or a single group).
    AggregateId
}
