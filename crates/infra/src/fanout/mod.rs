//! Live fan-out of enriched records (server-push listeners).

pub mod publisher;
pub mod subscription;

pub use publisher::{FanoutPublisher, FanoutStats, SubscriberInfo};
pub use subscription::{LiveSubscription, SubscriptionState};
