//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes outbound notifications to whoever listens: an email
//! relay, an audit sink, a test asserting that a period was closed. It is not a
//! store; the billing stores are the source of truth and the bus only carries
//! copies of facts that already happened.
//!
//! Delivery is at-least-once and unordered across publishers, so consumers
//! must tolerate duplicates.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to an event stream (broadcast semantics: every subscription
/// receives its own copy of each published message).
///
/// ```ignore
/// let subscription = bus.subscribe();
/// while let Ok(envelope) = subscription.recv_timeout(Duration::from_secs(1)) {
///     relay(envelope);
/// }
/// ```
///
/// Intended for a single consuming thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// The billing core publishes fire-and-forget notifications through this
/// trait ("invoice activated", "period closed", ...). Publication happens after
/// the state change is stored; a failed publish never rolls the change back.
///
/// ## Delivery Guarantees
///
/// **At-least-once**: events may be delivered more than once or out of order,
/// so consumers must be idempotent (the envelope's `event_id` helps).
///
/// ## Thread Safety
///
/// The trait requires `Send + Sync`: multiple threads (request handlers and
/// the activation scheduler) publish concurrently.
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


