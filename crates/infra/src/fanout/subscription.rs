use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use uuid::Uuid;

use ratingflow_events::EnrichedRecord;

use crate::config::OverflowPolicy;

use super::publisher::Shared;

/// Lifecycle of a live subscription.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Active,
    Closed,
}

/// Result of offering one record to a subscriber queue.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Offer {
    Queued,
    DroppedOldest,
    DroppedNewest,
    Overflowed,
    Closed,
}

/// Bounded queue owned by one subscriber.
#[derive(Debug)]
pub(crate) struct SubscriberQueue {
    pub(crate) id: Uuid,
    pub(crate) subscribed_at: DateTime<Utc>,
    capacity: usize,
    buffer: Mutex<VecDeque<EnrichedRecord>>,
    closed: AtomicBool,
    // Single consumer: notify_one stores a permit, so no wakeup is lost.
    ready: Notify,
}

impl SubscriberQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            id: Uuid::now_v7(),
            subscribed_at: Utc::now(),
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            closed: AtomicBool::new(false),
            ready: Notify::new(),
        }
    }

    pub(crate) fn offer(&self, record: &EnrichedRecord, policy: OverflowPolicy) -> Offer {
        if self.is_closed() {
            return Offer::Closed;
        }

        let outcome = {
            let mut buf = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            if buf.len() < self.capacity {
                buf.push_back(record.clone());
                Offer::Queued
            } else {
                match policy {
                    OverflowPolicy::DropOldest => {
                        buf.pop_front();
                        buf.push_back(record.clone());
                        Offer::DroppedOldest
                    }
                    OverflowPolicy::DropNewest => Offer::DroppedNewest,
                    OverflowPolicy::Disconnect => Offer::Overflowed,
                }
            }
        };

        match outcome {
            Offer::Overflowed => self.close(),
            Offer::DroppedNewest => {}
            _ => self.ready.notify_one(),
        }
        outcome
    }

    fn pop(&self) -> Option<EnrichedRecord> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }

    pub(crate) fn queued(&self) -> usize {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.notify_one();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Handle held by one live listener.
///
/// Records published after the subscription was created are delivered in
/// publish order, subject to the publisher's overflow policy. Dropping the
/// handle closes and deregisters the subscription immediately.
#[derive(Debug)]
pub struct LiveSubscription {
    queue: std::sync::Arc<SubscriberQueue>,
    publisher: Weak<Shared>,
}

impl LiveSubscription {
    pub(crate) fn new(queue: std::sync::Arc<SubscriberQueue>, publisher: Weak<Shared>) -> Self {
        Self { queue, publisher }
    }

    pub fn id(&self) -> Uuid {
        self.queue.id
    }

    pub fn subscribed_at(&self) -> DateTime<Utc> {
        self.queue.subscribed_at
    }

    pub fn state(&self) -> SubscriptionState {
        if self.queue.is_closed() {
            SubscriptionState::Closed
        } else {
            SubscriptionState::Active
        }
    }

    /// Wait for the next record.
    ///
    /// Returns `None` once the subscription is closed (publisher shutdown or
    /// disconnected for overflow) and every record queued before closing has
    /// been taken. Cancel-safe: dropping the future loses nothing.
    pub async fn recv(&mut self) -> Option<EnrichedRecord> {
        loop {
            if let Some(record) = self.queue.pop() {
                return Some(record);
            }
            if self.queue.is_closed() {
                return None;
            }
            self.queue.ready.notified().await;
        }
    }

    /// Take the next queued record without waiting.
    pub fn try_recv(&mut self) -> Option<EnrichedRecord> {
        self.queue.pop()
    }

    /// Number of records waiting in this subscription's queue.
    pub fn queued(&self) -> usize {
        self.queue.queued()
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.queue.close();
        if let Some(shared) = self.publisher.upgrade() {
            shared.deregister(self.queue.id);
        }
    }
}
