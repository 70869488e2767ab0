//! The streaming core and its concurrency primitives.

pub mod gate;
pub mod key_locks;
pub mod rating_pipeline;

pub use gate::PipelineGate;
pub use key_locks::KeyLocks;
pub use rating_pipeline::{MetadataOutcome, PipelineStats, RatingOutcome, RatingPipeline};
