//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring (topics, pipeline runtime, view, fan-out)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::config::ApiConfig;

pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router over already-running services.
pub fn router(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

/// Start the services and build the router (public entrypoint used by tests).
pub fn build_app(config: &ApiConfig) -> anyhow::Result<(Router, Arc<AppServices>)> {
    let services = Arc::new(services::build_services(config)?);
    Ok((router(services.clone()), services))
}
