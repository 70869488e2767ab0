//! `ratingflow-core`: shared building blocks.
//!
//! This crate contains **pure** primitives (no infrastructure concerns): the
//! entity identifier and the pipeline error taxonomy.

pub mod error;
pub mod id;

pub use error::{PipelineError, PipelineResult};
pub use id::EntityId;
