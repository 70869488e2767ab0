//! Ratings domain module.
//!
//! This crate contains the pure rating logic: running averages per entity and
//! the value joiner that combines catalog metadata with an average. No IO, no
//! HTTP, no storage.

pub mod aggregator;
pub mod enrich;

pub use aggregator::{AggregateState, KeyedAggregator, validate_score};
pub use enrich::{enrich, join};
