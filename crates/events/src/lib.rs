//! `fairshare-events`: event contracts and pub/sub mechanics.
//!
//! Domain modules define their typed events against the [`Event`] trait;
//! infrastructure wraps them in [`EventEnvelope`]s and distributes them over an
//! [`EventBus`].

pub mod bus;
pub mod envelope;
pub mod event;

pub use bus::{EventBus, InMemoryBusError, InMemoryEventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
