use std::collections::BTreeMap;

use ratingflow_core::EntityId;
use ratingflow_events::{EnrichedRecord, RecordSink, SinkError};

use crate::read_model::TableStore;

/// Queryable view of the latest enriched record per entity.
///
/// This is a disposable read model fed by the joiner's output like any other
/// sink; the pipeline never reads it back.
#[derive(Debug)]
pub struct RatedMoviesView<S>
where
    S: TableStore<EntityId, EnrichedRecord>,
{
    name: String,
    store: S,
}

impl<S> RatedMoviesView<S>
where
    S: TableStore<EntityId, EnrichedRecord>,
{
    pub fn new(name: impl Into<String>, store: S) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    pub fn get(&self, id: EntityId) -> Option<EnrichedRecord> {
        self.store.get(&id)
    }

    /// Every record, ordered by entity id.
    pub fn report(&self) -> BTreeMap<EntityId, EnrichedRecord> {
        self.store
            .list()
            .into_iter()
            .map(|r| (r.entity_id, r))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl<S> RecordSink<EnrichedRecord> for RatedMoviesView<S>
where
    S: TableStore<EntityId, EnrichedRecord>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&self, record: &EnrichedRecord) -> Result<(), SinkError> {
        self.store.upsert(record.entity_id, record.clone());
        Ok(())
    }
}
