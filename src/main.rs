use anyhow::{Context, Result};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relink::app::{create_router, AppState};
use relink::config::Config;
use relink::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("relink=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    info!("Initializing database...");
    let stores = storage::open(&config.database).await?;
    info!("Database initialized successfully");

    let state = AppState::build(&config, stores)?;
    info!(
        "Short codes: {} symbols, length {} (max {}), {} attempts per allocation",
        config.short_code.alphabet.chars().count(),
        config.short_code.length,
        config.short_code.max_length,
        config.short_code.max_attempts
    );

    let app = create_router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🚀 Server listening on http://{}", addr);
    info!("   - API endpoints available at http://{}/api/...", addr);
    info!("   - Redirects served at http://{}/{{code}}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Flushing pending click events...");
    state.recorder.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
