//! Value joiner: catalog metadata + current average → enriched record.

use ratingflow_events::{AverageEntry, EnrichedRecord, MetadataRecord};

/// Combine one metadata record with the average for the same entity.
pub fn enrich(metadata: &MetadataRecord, average: &AverageEntry) -> EnrichedRecord {
    debug_assert_eq!(metadata.entity_id, average.entity_id);

    EnrichedRecord {
        entity_id: metadata.entity_id,
        release_year: metadata.release_year,
        title: metadata.title.clone(),
        average: average.average,
    }
}

/// Inner join of the two table sides for one key.
///
/// A missing side is a normal state (the counterpart has not arrived yet) and
/// yields `None`, never a partial record.
pub fn join(metadata: Option<&MetadataRecord>, average: Option<&AverageEntry>) -> Option<EnrichedRecord> {
    match (metadata, average) {
        (Some(m), Some(a)) => Some(enrich(m, a)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratingflow_core::EntityId;

    #[test]
    fn both_sides_present_produce_a_record() {
        let movie = MetadataRecord::new(1, 1999, "X");
        let avg = AverageEntry {
            entity_id: EntityId::new(1),
            average: 4.0,
        };

        let rec = join(Some(&movie), Some(&avg)).unwrap();
        assert_eq!(rec.entity_id, EntityId::new(1));
        assert_eq!(rec.release_year, 1999);
        assert_eq!(rec.title, "X");
        assert_eq!(rec.average, 4.0);
    }

    #[test]
    fn a_missing_side_produces_nothing() {
        let movie = MetadataRecord::new(1, 1999, "X");
        let avg = AverageEntry {
            entity_id: EntityId::new(1),
            average: 4.0,
        };

        assert!(join(Some(&movie), None).is_none());
        assert!(join(None, Some(&avg)).is_none());
        assert!(join(None, None).is_none());
    }
}
