//! Records and the topic (pub/sub) abstraction.
//!
//! - `record`: the four record types that cross the pipeline boundary
//! - `bus`: transport-agnostic topic contract (`EventBus` / `Subscription`)
//! - `in_memory_bus`: in-process topic for tests/dev
//! - `sink`: outbound record sinks (durable re-publish, views, fan-out)

pub mod bus;
pub mod in_memory_bus;
pub mod keyed;
pub mod record;
pub mod sink;

pub use bus::{ConnectivityListener, EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use keyed::Keyed;
pub use record::{AverageEntry, EnrichedRecord, MetadataRecord, RatingEvent};
pub use sink::{RecordSink, SinkError};
