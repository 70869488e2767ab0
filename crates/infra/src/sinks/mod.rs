//! Output sinks for pipeline results.
//!
//! - [`TopicSink`]: republish records onto a topic (durable output)
//! - [`QueuedSink`]: decouple a slow sink from the pipeline with a bounded
//!   queue; producers block when it is full, so nothing is dropped

pub mod queued;
pub mod topic;

pub use queued::QueuedSink;
pub use topic::TopicSink;
