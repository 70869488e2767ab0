//! Infrastructure layer: table caches, the rating pipeline, sinks, workers,
//! fan-out and substrate-backed topics.

pub mod config;
pub mod event_bus;
pub mod fanout;
pub mod pipeline;
pub mod projections;
pub mod read_model;
pub mod runtime;
pub mod sinks;
pub mod workers;


pub use config::{FanoutConfig, OverflowPolicy, PipelineConfig, TopologyConfig};
pub use pipeline::RatingPipeline;
pub use runtime::{InMemoryTopics, PipelineRuntime};
