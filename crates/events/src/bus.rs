//! Topic publishing/subscription abstraction (mechanics only).
//!
//! A topic is the pipeline's view of the messaging substrate: rating events,
//! metadata updates, average updates, and enriched records all travel over
//! implementations of [`EventBus`].
//!
//! ## Design Philosophy
//!
//! - **Transport-agnostic**: in-memory channels, Redis Streams, a broker, ...
//! - **Broadcast semantics**: each subscription sees every message published
//!   after it was created
//! - **Ordering**: messages from a single publisher are observed in publish order
//! - **No persistence contract**: retention belongs to the substrate, not to the core

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to a topic.
///
/// ## Usage Pattern
///
/// ```ignore
/// let topic: Arc<dyn EventBus<RatingEvent, Error = _>> = ...;
/// let subscription = topic.subscribe();
///
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(event) => pipeline.ingest_rating(event)?,
///         Err(RecvTimeoutError::Timeout) => continue,   // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break, // topic closed
///     }
/// }
/// ```
///
/// Subscriptions are meant to be consumed from one thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
    cancelled: Option<Arc<AtomicBool>>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self {
            receiver,
            cancelled: None,
        }
    }

    /// A subscription whose producer polls the returned flag; it is set when
    /// the subscription is dropped.
    ///
    /// For producers that may sit idle for a long time (a blocking read on a
    /// remote stream) and would otherwise only notice a dropped receiver on
    /// their next send.
    pub fn cancellable(receiver: Receiver<M>) -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        let sub = Self {
            receiver,
            cancelled: Some(flag.clone()),
        };
        (sub, flag)
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
}

impl<M> Drop for Subscription<M> {
    fn drop(&mut self) {
        if let Some(flag) = &self.cancelled {
            flag.store(true, Ordering::Release);
        }
    }
}

/// Told when a topic's substrate becomes unreachable and when it comes back.
///
/// Implementations report transitions only: one `unavailable` per outage,
/// followed by one `recovered` once reads succeed again.
pub trait ConnectivityListener: Send + Sync {
    fn unavailable(&self, topic: &str, reason: &str);

    fn recovered(&self, topic: &str);
}

/// Topic-agnostic pub/sub contract.
///
/// ```text
/// ratings topic ──► RatingPipeline ──► rated-movies topic (durable)
/// movies topic  ──►                └─► fan-out ──► live listeners
/// ```
///
/// `publish()` can fail (closed topic, network error); the caller decides
/// whether that is fatal. Implementations must be `Send + Sync` so that
/// multiple producers can publish concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;

    /// Like [`subscribe`](Self::subscribe), reporting connectivity changes of
    /// the substrate to `listener`. In-process topics cannot lose
    /// connectivity and ignore it.
    fn subscribe_with(&self, listener: Arc<dyn ConnectivityListener>) -> Subscription<M> {
        let _ = listener;
        self.subscribe()
    }
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

    fn subscribe_with(&self, listener: Arc<dyn ConnectivityListener>) -> Subscription<M> {
        (**self).subscribe_with(listener)
    }
}
