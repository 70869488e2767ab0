use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};

use ratingflow_core::EntityId;

use crate::app::errors::{json_error, pipeline_error_to_response};
use crate::app::services::AppServices;

/// GET /report
///
/// Latest enriched record per entity, keyed by entity id.
pub async fn list(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(services.view().report())
}

/// GET /report/:id
pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: EntityId = match id.parse() {
        Ok(id) => id,
        Err(e) => return pipeline_error_to_response(e),
    };

    match services.view().get(id) {
        Some(record) => Json(record).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "not_found", format!("no rated movie {id}")),
    }
}
