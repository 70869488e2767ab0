use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use ratingflow_core::PipelineError;

pub fn pipeline_error_to_response(err: PipelineError) -> axum::response::Response {
    match err {
        PipelineError::InvalidInput(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_input", msg),
        PipelineError::Paused => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "paused", "pipeline is paused")
        }
        PipelineError::UpstreamUnavailable(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable", msg)
        }
        PipelineError::SubscriberUnavailable(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "subscriber_unavailable", msg)
        }
        PipelineError::SinkUnavailable(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Map a JSON body rejection to the standard 400 error body.
pub fn json_rejection(rejection: axum::extract::rejection::JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_json", rejection.body_text())
}
