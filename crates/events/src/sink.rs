//! Outbound record sinks.
//!
//! The joiner's single output is handed to every registered sink: the durable
//! re-publish topic, the queryable view, and the live fan-out. Sinks must not
//! block on external IO; anything slow belongs behind a queue.

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The sink (or the queue in front of it) has been closed.
    #[error("sink closed: {0}")]
    Closed(String),

    /// The underlying transport rejected the record.
    #[error("sink transport error: {0}")]
    Transport(String),
}

/// A consumer of pipeline output.
pub trait RecordSink<M>: Send + Sync {
    /// Short, stable name for logs.
    fn name(&self) -> &str;

    fn accept(&self, record: &M) -> Result<(), SinkError>;
}

impl<M, S> RecordSink<M> for Arc<S>
where
    S: RecordSink<M> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn accept(&self, record: &M) -> Result<(), SinkError> {
        (**self).accept(record)
    }
}
