//! Record types exchanged with the messaging substrate.
//!
//! All records serialize as compact JSON objects with camelCase field names
//! (`entityId`, `releaseYear`, ...).

use serde::{Deserialize, Serialize};

use ratingflow_core::EntityId;

/// One rating of one entity. Repeats for the same entity are expected and all count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingEvent {
    pub entity_id: EntityId,
    pub score: f64,
}

impl RatingEvent {
    pub fn new(entity_id: impl Into<EntityId>, score: f64) -> Self {
        Self {
            entity_id: entity_id.into(),
            score,
        }
    }
}

/// Catalog metadata for an entity (latest version wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub entity_id: EntityId,
    pub release_year: i32,
    pub title: String,
}

impl MetadataRecord {
    pub fn new(entity_id: impl Into<EntityId>, release_year: i32, title: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            release_year,
            title: title.into(),
        }
    }
}

/// Current average rating for an entity, as computed by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageEntry {
    pub entity_id: EntityId,
    pub average: f64,
}

/// Metadata joined with the current average. Only ever exists as an emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    pub entity_id: EntityId,
    pub release_year: i32,
    pub title: String,
    pub average: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enriched_record_uses_camel_case_fields() {
        let rec = EnrichedRecord {
            entity_id: EntityId::new(1),
            release_year: 1999,
            title: "X".to_string(),
            average: 4.0,
        };

        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"entityId": 1, "releaseYear": 1999, "title": "X", "average": 4.0})
        );

        let back: EnrichedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn rating_event_decodes_from_wire_shape() {
        let ev: RatingEvent = serde_json::from_str(r#"{"entityId":12,"score":3.5}"#).unwrap();
        assert_eq!(ev, RatingEvent::new(12, 3.5));
    }

    #[test]
    fn metadata_record_rejects_missing_title() {
        let res = serde_json::from_str::<MetadataRecord>(r#"{"entityId":1,"releaseYear":1999}"#);
        assert!(res.is_err());
    }
}
