use ratingflow_core::EntityId;

use crate::record::{AverageEntry, EnrichedRecord, MetadataRecord, RatingEvent};

/// Helper trait for entity-keyed messages.
///
/// Every record on every topic is keyed by its entity. Infrastructure
/// (workers, per-key locks, Redis stream fields) uses this to route and
/// serialize work without knowing the concrete record type.
pub trait Keyed {
    fn key(&self) -> EntityId;
}

impl Keyed for RatingEvent {
    fn key(&self) -> EntityId {
        self.entity_id
    }
}

impl Keyed for MetadataRecord {
    fn key(&self) -> EntityId {
        self.entity_id
    }
}

impl Keyed for AverageEntry {
    fn key(&self) -> EntityId {
        self.entity_id
    }
}

impl Keyed for EnrichedRecord {
    fn key(&self) -> EntityId {
        self.entity_id
    }
}
