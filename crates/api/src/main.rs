use anyhow::Context as _;

use ratingflow_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ratingflow_observability::init();

    let config = ApiConfig::from_env();
    let (app, services) = ratingflow_api::app::build_app(&config)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    let signal_services = services.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            // Ends open SSE streams so the server can drain.
            signal_services.fanout().shutdown();
        })
        .await?;

    tokio::task::spawn_blocking(move || services.shutdown()).await?;
    Ok(())
}
