use axum::{
    Router,
    routing::{get, post, put},
};

pub mod ingest;
pub mod report;
pub mod stream;
pub mod system;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .route("/ratings", post(ingest::post_rating))
        .route("/movies/:id", put(ingest::put_movie))
        .route("/sse", get(stream::sse))
        .route("/report", get(report::list))
        .route("/report/:id", get(report::get_one))
        .route("/pipeline", get(system::status))
        .route("/pipeline/pause", post(system::pause))
        .route("/pipeline/resume", post(system::resume))
}
