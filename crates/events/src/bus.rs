//! Event distribution: the hop between "durable" and "queryable".
//!
//! Publication always happens after the append: the store is the source of
//! truth and the bus is only transport. Losing or re-delivering a message is
//! therefore recoverable; consumers keep per-stream cursors and a projection
//! can always be rebuilt from the store.

use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use thiserror::Error;

/// Broadcast fan-out to everything subscribed at publish time.
///
/// Implementations own the transport; this crate ships the in-process
/// [`InMemoryEventBus`], and a deployment with an external broker would
/// implement the same trait. A failed `publish` may be retried freely since
/// the events behind it are already persisted.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

/// One subscriber's end of the fan-out.
///
/// Every subscription sees every message published after it was created,
/// in publish order. Consume from a single thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: mpsc::Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: mpsc::Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message (or the bus is gone).
    pub fn recv(&self) -> Result<M, mpsc::RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<M, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    /// The subscriber list lock was poisoned by a panicking publisher.
    #[error("event bus subscriber list is poisoned")]
    Poisoned,
}

/// Channel-backed bus for tests and single-process deployments.
///
/// Each subscriber gets its own unbounded channel; publishing clones the
/// message once per live subscriber and silently forgets subscribers whose
/// receiving side has been dropped.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| InMemoryBusError::Poisoned)?;

        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        // A poisoned bus hands out a subscription that never fires rather
        // than panicking in the subscriber.
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_every_message() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish(7).unwrap();
        bus.publish(11).unwrap();

        assert_eq!(first.recv().unwrap(), 7);
        assert_eq!(first.recv().unwrap(), 11);
        assert_eq!(second.recv().unwrap(), 7);
        assert_eq!(second.recv().unwrap(), 11);
    }

    #[test]
    fn dropped_subscriber_does_not_break_publishing() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(3).unwrap();
        assert_eq!(keep.recv().unwrap(), 3);
    }

    #[test]
    fn late_subscriber_misses_earlier_messages() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        bus.publish(1).unwrap();

        let late = bus.subscribe();
        bus.publish(2).unwrap();
        assert_eq!(late.recv().unwrap(), 2);
        assert!(late.try_recv().is_err());
    }
}
