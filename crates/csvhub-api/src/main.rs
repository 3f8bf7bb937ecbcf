//! csvhub API Server
//!
//! REST API for uploading CSV files, browsing them, and joining them with
//! records from external HTTP APIs.

use clap::Parser;
use csvhub_api::{build_router, AppState, CatalogService, ServerConfig};
use csvhub_fetch::Fetcher;
use csvhub_storage::backend_from_uri;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();
    tracing::info!(catalog = %config.catalog, "Using catalog");

    let backend = backend_from_uri(&config.catalog).unwrap_or_else(|e| {
        tracing::error!("Failed to create backend: {}", e);
        std::process::exit(1);
    });
    if let Err(e) = backend.initialize().await {
        tracing::error!("Failed to initialize catalog: {}", e);
        std::process::exit(1);
    }

    let fetcher = Fetcher::new(config.fetcher_config()).unwrap_or_else(|e| {
        tracing::error!("Invalid fetcher configuration: {}", e);
        std::process::exit(1);
    });

    let state = AppState::new(CatalogService::new(Arc::from(backend), fetcher));
    let app = build_router(state, config.max_upload_bytes);

    let addr = config.socket_addr().unwrap_or_else(|e| {
        tracing::error!("{}", e);
        std::process::exit(1);
    });
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        });
    tracing::info!("csvhub API listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
    tracing::info!("csvhub API stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
