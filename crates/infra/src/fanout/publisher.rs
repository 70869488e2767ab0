use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ratingflow_core::PipelineError;
use ratingflow_events::{EnrichedRecord, RecordSink, SinkError};

use crate::config::FanoutConfig;

use super::subscription::{LiveSubscription, Offer, SubscriberQueue};

/// Runtime counters for the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutStats {
    pub published: u64,
    pub dropped: u64,
    pub disconnected: u64,
    pub active_subscribers: usize,
}

/// One registered listener, as seen from the outside.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberInfo {
    pub id: Uuid,
    pub subscribed_at: DateTime<Utc>,
    pub queued: usize,
}

#[derive(Debug)]
pub(crate) struct Shared {
    config: FanoutConfig,
    subscribers: RwLock<HashMap<Uuid, Arc<SubscriberQueue>>>,
    shut_down: AtomicBool,
    published: AtomicU64,
    dropped: AtomicU64,
    disconnected: AtomicU64,
}

impl Shared {
    pub(crate) fn deregister(&self, id: Uuid) {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            debug!(subscription_id = %id, "live subscription closed");
        }
    }
}

/// Fan-out of enriched records to live listeners.
///
/// ## Delivery model
///
/// Each subscriber owns a bounded queue (`FanoutConfig::capacity`).
/// `publish` appends the record to every active queue and returns
/// immediately; it never waits for a consumer. When a queue is full the
/// configured [`OverflowPolicy`](crate::config::OverflowPolicy) decides:
///
/// - `DropOldest`: evict the oldest queued record for that subscriber
/// - `DropNewest`: skip the new record for that subscriber
/// - `Disconnect`: close that subscriber (`SubscriberUnavailable`)
///
/// Other subscribers and the upstream pipeline are never affected by one slow
/// or gone listener.
///
/// ## Lifecycle
///
/// A subscription is `Active` until its handle is dropped, it is disconnected
/// for overflow, or the publisher shuts down; it is then `Closed` and
/// deregistered. There is no replay: a new subscription only sees records
/// published after it was created.
#[derive(Debug, Clone)]
pub struct FanoutPublisher {
    shared: Arc<Shared>,
}

impl Default for FanoutPublisher {
    fn default() -> Self {
        Self::new(FanoutConfig::default())
    }
}

impl FanoutPublisher {
    pub fn new(config: FanoutConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                subscribers: RwLock::new(HashMap::new()),
                shut_down: AtomicBool::new(false),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                disconnected: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> FanoutConfig {
        self.shared.config
    }

    /// Register a new listener.
    ///
    /// After [`shutdown`](Self::shutdown) this returns an already-closed
    /// subscription.
    pub fn subscribe(&self) -> LiveSubscription {
        let queue = Arc::new(SubscriberQueue::new(self.shared.config.capacity));

        {
            // `shutdown` drains under this lock, so the flag is checked here too.
            let mut subs = self.shared.subscribers.write().unwrap_or_else(PoisonError::into_inner);
            if self.shared.shut_down.load(Ordering::Acquire) {
                queue.close();
            } else {
                subs.insert(queue.id, queue.clone());
                debug!(subscription_id = %queue.id, "live subscription opened");
            }
        }

        LiveSubscription::new(queue, Arc::downgrade(&self.shared))
    }

    /// Hand one record to every active subscriber. Returns how many queues
    /// accepted it.
    pub fn publish(&self, record: &EnrichedRecord) -> usize {
        if self.shared.shut_down.load(Ordering::Acquire) {
            return 0;
        }
        self.shared.published.fetch_add(1, Ordering::Relaxed);

        let policy = self.shared.config.overflow;
        let mut delivered = 0;
        let mut gone = Vec::new();

        {
            let subs = self.shared.subscribers.read().unwrap_or_else(PoisonError::into_inner);
            for (id, queue) in subs.iter() {
                match queue.offer(record, policy) {
                    Offer::Queued => delivered += 1,
                    Offer::DroppedOldest => {
                        delivered += 1;
                        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Offer::DroppedNewest => {
                        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Offer::Overflowed => {
                        let err = PipelineError::subscriber_unavailable(format!(
                            "queue full ({} records)",
                            self.shared.config.capacity
                        ));
                        warn!(subscription_id = %id, error = %err, "disconnecting slow subscriber");
                        self.shared.disconnected.fetch_add(1, Ordering::Relaxed);
                        gone.push(*id);
                    }
                    Offer::Closed => gone.push(*id),
                }
            }
        }

        for id in gone {
            self.shared.deregister(id);
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn subscribers(&self) -> Vec<SubscriberInfo> {
        let subs = self.shared.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<SubscriberInfo> = subs
            .values()
            .map(|q| SubscriberInfo {
                id: q.id,
                subscribed_at: q.subscribed_at,
                queued: q.queued(),
            })
            .collect();
        out.sort_by_key(|s| s.subscribed_at);
        out
    }

    pub fn stats(&self) -> FanoutStats {
        FanoutStats {
            published: self.shared.published.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            disconnected: self.shared.disconnected.load(Ordering::Relaxed),
            active_subscribers: self.subscriber_count(),
        }
    }

    /// Close every subscription and stop accepting new ones.
    ///
    /// Pending `recv` calls wake up and drain what was already queued.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained: Vec<Arc<SubscriberQueue>> = self
            .shared
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, q)| q)
            .collect();

        for queue in &drained {
            queue.close();
        }
        info!(closed = drained.len(), "fan-out publisher shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }
}

impl RecordSink<EnrichedRecord> for FanoutPublisher {
    fn name(&self) -> &str {
        "fanout"
    }

    fn accept(&self, record: &EnrichedRecord) -> Result<(), SinkError> {
        self.publish(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::fanout::SubscriptionState;
    use proptest::prelude::*;
    use ratingflow_core::EntityId;
    use std::time::Duration;

    fn rec(n: i64) -> EnrichedRecord {
        EnrichedRecord {
            entity_id: EntityId::new(n),
            release_year: 1999,
            title: format!("movie-{n}"),
            average: n as f64,
        }
    }

    fn publisher(capacity: usize, overflow: OverflowPolicy) -> FanoutPublisher {
        FanoutPublisher::new(FanoutConfig { capacity, overflow })
    }

    #[tokio::test]
    async fn every_subscriber_receives_every_record() {
        let p = FanoutPublisher::default();
        let mut a = p.subscribe();
        let mut b = p.subscribe();

        assert_eq!(p.publish(&rec(1)), 2);
        assert_eq!(p.publish(&rec(2)), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await.unwrap().entity_id, EntityId::new(1));
            assert_eq!(sub.recv().await.unwrap().entity_id, EntityId::new(2));
        }
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_later_records() {
        let p = FanoutPublisher::default();
        let early = p.subscribe();
        for n in 0..3 {
            p.publish(&rec(n));
        }

        let mut late = p.subscribe();
        p.publish(&rec(10));

        assert_eq!(late.recv().await.unwrap().entity_id, EntityId::new(10));
        assert!(late.try_recv().is_none());
        assert_eq!(early.queued(), 4);
    }

    #[tokio::test]
    async fn recv_waits_for_a_publish() {
        let p = FanoutPublisher::default();
        let mut sub = p.subscribe();

        let publisher = p.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(&rec(7));
        });

        let got = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("recv should wake up after publish");
        assert_eq!(got.unwrap().entity_id, EntityId::new(7));
    }

    #[test]
    fn drop_oldest_keeps_the_newest_records() {
        let p = publisher(2, OverflowPolicy::DropOldest);
        let mut sub = p.subscribe();
        for n in 1..=4 {
            p.publish(&rec(n));
        }

        let got: Vec<i64> = std::iter::from_fn(|| sub.try_recv())
            .map(|r| r.entity_id.get())
            .collect();
        assert_eq!(got, vec![3, 4]);
        assert_eq!(p.stats().dropped, 2);
    }

    #[test]
    fn drop_newest_keeps_the_oldest_records() {
        let p = publisher(2, OverflowPolicy::DropNewest);
        let mut sub = p.subscribe();
        for n in 1..=4 {
            p.publish(&rec(n));
        }

        let got: Vec<i64> = std::iter::from_fn(|| sub.try_recv())
            .map(|r| r.entity_id.get())
            .collect();
        assert_eq!(got, vec![1, 2]);
    }

    #[tokio::test]
    async fn disconnect_policy_closes_only_the_slow_subscriber() {
        let p = publisher(1, OverflowPolicy::Disconnect);
        let mut slow = p.subscribe();
        let mut fast = p.subscribe();

        p.publish(&rec(1));
        assert_eq!(fast.recv().await.unwrap().entity_id, EntityId::new(1));

        p.publish(&rec(2));
        assert_eq!(slow.state(), SubscriptionState::Closed);
        assert_eq!(fast.state(), SubscriptionState::Active);
        assert_eq!(p.subscriber_count(), 1);

        // The slow subscriber still drains what it had, then ends.
        assert_eq!(slow.recv().await.unwrap().entity_id, EntityId::new(1));
        assert!(slow.recv().await.is_none());
        assert_eq!(fast.recv().await.unwrap().entity_id, EntityId::new(2));
    }

    #[test]
    fn dropping_a_subscription_deregisters_it() {
        let p = FanoutPublisher::default();
        let sub = p.subscribe();
        let _other = p.subscribe();
        assert_eq!(p.subscriber_count(), 2);

        drop(sub);
        assert_eq!(p.subscriber_count(), 1);
        assert_eq!(p.publish(&rec(1)), 1);
    }

    #[tokio::test]
    async fn shutdown_wakes_pending_receivers() {
        let p = FanoutPublisher::default();
        let mut sub = p.subscribe();

        let waiter = tokio::spawn(async move { sub.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        p.shutdown();

        let got = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("receiver should wake on shutdown")
            .unwrap();
        assert!(got.is_none());
        assert_eq!(p.publish(&rec(1)), 0);

        let mut after = p.subscribe();
        assert_eq!(after.state(), SubscriptionState::Closed);
        assert!(after.recv().await.is_none());
    }

    #[test]
    fn subscribe_racing_shutdown_never_leaves_an_open_subscription() {
        for _ in 0..500 {
            let p = FanoutPublisher::default();
            let barrier = Arc::new(std::sync::Barrier::new(2));

            let subscriber = {
                let p = p.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    p.subscribe()
                })
            };
            barrier.wait();
            p.shutdown();

            let sub = subscriber.join().unwrap();
            assert_eq!(sub.state(), SubscriptionState::Closed);
            assert_eq!(p.subscriber_count(), 0);
        }
    }

    proptest! {
        #[test]
        fn drop_oldest_always_keeps_the_latest_window(capacity in 1usize..16, count in 0i64..64) {
            let p = publisher(capacity, OverflowPolicy::DropOldest);
            let mut sub = p.subscribe();
            for n in 0..count {
                p.publish(&rec(n));
            }

            let got: Vec<i64> = std::iter::from_fn(|| sub.try_recv())
                .map(|r| r.entity_id.get())
                .collect();
            let start = (count - capacity as i64).max(0);
            prop_assert_eq!(got, (start..count).collect::<Vec<_>>());
        }
    }
}
