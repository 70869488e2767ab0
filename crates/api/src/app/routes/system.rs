use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /pipeline
pub async fn status(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let pipeline = services.pipeline();
    Json(json!({
        "paused": pipeline.is_paused(),
        "pipeline": pipeline.stats(),
        "fanout": services.fanout().stats(),
        "subscribers": services.fanout().subscribers(),
        "topology": services.topology(),
        "reportSize": services.view().len(),
    }))
}

/// POST /pipeline/pause
pub async fn pause(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let changed = services.pipeline().pause();
    Json(json!({ "paused": true, "changed": changed }))
}

/// POST /pipeline/resume
pub async fn resume(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let changed = services.pipeline().resume();
    Json(json!({ "paused": false, "changed": changed }))
}
