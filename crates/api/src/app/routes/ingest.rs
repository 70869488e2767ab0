//! Ingestion endpoints: records are published onto the inbound topics and
//! processed asynchronously by the pipeline workers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use ratingflow_core::EntityId;
use ratingflow_events::{MetadataRecord, RatingEvent};
use ratingflow_ratings::validate_score;

use crate::app::errors::{json_rejection, pipeline_error_to_response};
use crate::app::services::AppServices;

/// Body of `PUT /movies/:id`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieBody {
    pub release_year: i32,
    pub title: String,
}

/// POST /ratings
pub async fn post_rating(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<RatingEvent>, JsonRejection>,
) -> axum::response::Response {
    let Json(event) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection(rejection),
    };

    if let Err(e) = validate_score(event.score) {
        return pipeline_error_to_response(e);
    }

    match services.topics().publish_rating(event) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "entityId": event.entity_id, "topic": services.topology().ratings })),
        )
            .into_response(),
        Err(e) => pipeline_error_to_response(e),
    }
}

/// PUT /movies/:id
pub async fn put_movie(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<MovieBody>, JsonRejection>,
) -> axum::response::Response {
    let id: EntityId = match id.parse() {
        Ok(id) => id,
        Err(e) => return pipeline_error_to_response(e),
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return json_rejection(rejection),
    };

    let record = MetadataRecord::new(id, body.release_year, body.title);
    match services.topics().publish_movie(record) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "entityId": id, "topic": services.topology().movies })),
        )
            .into_response(),
        Err(e) => pipeline_error_to_response(e),
    }
}
