use tracing::trace;

use ratingflow_core::EntityId;
use ratingflow_events::{AverageEntry, EnrichedRecord, MetadataRecord};
use ratingflow_ratings::enrich;

use crate::read_model::TableStore;

/// Level-triggered table-table join of catalog metadata and averages.
///
/// Every update to either table calls [`EnrichmentJoiner::on_update`] for the
/// touched key. The joiner reads both tables (two independent reads, not a
/// joint snapshot) and, if both sides exist, builds one [`EnrichedRecord`] from
/// the latest values. A missing side is normal and yields `None`.
///
/// Calling `on_update` again with no intervening table write returns an equal
/// record.
#[derive(Debug)]
pub struct EnrichmentJoiner<R, A>
where
    R: TableStore<EntityId, MetadataRecord>,
    A: TableStore<EntityId, AverageEntry>,
{
    reference: R,
    averages: A,
}

impl<R, A> EnrichmentJoiner<R, A>
where
    R: TableStore<EntityId, MetadataRecord>,
    A: TableStore<EntityId, AverageEntry>,
{
    pub fn new(reference: R, averages: A) -> Self {
        Self { reference, averages }
    }

    pub fn reference(&self) -> &R {
        &self.reference
    }

    pub fn averages(&self) -> &A {
        &self.averages
    }

    pub fn on_update(&self, key: EntityId) -> Option<EnrichedRecord> {
        let Some(metadata) = self.reference.get(&key) else {
            trace!(entity_id = %key, "join miss: no metadata yet");
            return None;
        };
        let Some(average) = self.averages.get(&key) else {
            trace!(entity_id = %key, "join miss: no average yet");
            return None;
        };

        Some(enrich(&metadata, &average))
    }
}
