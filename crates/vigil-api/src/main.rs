//! Vigil API Server
//!
//! REST API server for session, API key, user and audit lifecycle.

use anyhow::Context;
use std::sync::Arc;
use vigil_api::{create_router, state::AppState};
use vigil_core::config::{AppConfig, LoggingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration: VIGIL_CONFIG names an optional TOML file, env wins
    let config = match std::env::var("VIGIL_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };

    init_tracing(&config.logging);

    config.check_signing_secret()?;
    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET is not set; using the development signing secret");
    }

    let store = vigil_core::open_store(&config.database)
        .await
        .context("failed to open credential store")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::new(config, store));

    // Create router
    let app = create_router(state.clone());

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Vigil API Server starting on http://{}", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain queued audit records before exiting
    state.audit.flush().await;
    tracing::info!("Vigil API Server stopped");

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            let level = &logging.level;
            format!("vigil_api={level},vigil_core={level},tower_http={level}").into()
        });

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
