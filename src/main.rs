use tracing_subscriber::EnvFilter;

use workbench_gateway::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, WORKBENCH_URL, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = workbench_gateway::config::config().clone();
    tracing::info!("Starting workbench gateway in {:?} mode", config.environment);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::build(config).await?;
    let database = state.database.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Workbench gateway listening on http://{}", bind_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    if let Some(db) = database {
        db.close().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
