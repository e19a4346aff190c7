use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use stackpress_api::config::StackpressConfig;
use stackpress_api::shutdown::ShutdownCoordinator;
use stackpress_api::{logging, router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = StackpressConfig::load().context("Invalid configuration")?;

    // Held until exit so buffered file logs are flushed
    let _log_guard = logging::init(&config.logging).context("Failed to initialize logging")?;
    info!("Configuration loaded successfully");

    let shutdown = ShutdownCoordinator::new();
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(AppState::production(config, shutdown.clone()));
    let app = router(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Stackpress API listening on {}", addr);

    let signals = shutdown.clone();
    tokio::spawn(async move { signals.wait_for_signal().await });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
