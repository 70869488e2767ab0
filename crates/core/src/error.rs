//! Pipeline error model.

use thiserror::Error;

/// Result type used across the pipeline.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline-level error.
///
/// None of these variants abort the pipeline as a whole. A missing cache entry
/// during a join is not represented here at all: it is an expected state and
/// surfaces as `Option::None`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A record was malformed or carried a non-finite rating value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A live listener could not be written to. Isolated to that listener.
    #[error("subscriber unavailable: {0}")]
    SubscriberUnavailable(String),

    /// Connectivity to the messaging substrate was lost.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Ingestion is paused (see the pipeline gate).
    #[error("pipeline paused")]
    Paused,

    /// The durable sink refused or could not accept a record.
    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),
}

impl PipelineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn subscriber_unavailable(msg: impl Into<String>) -> Self {
        Self::SubscriberUnavailable(msg.into())
    }

    pub fn upstream_unavailable(msg: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(msg.into())
    }

    pub fn sink_unavailable(msg: impl Into<String>) -> Self {
        Self::SinkUnavailable(msg.into())
    }
}
