//! Tribunal server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tribunal::config::TribunalConfig;
use tribunal::database::Database;
use tribunal::directory::SqliteDirectory;
use tribunal::error::{Result, TribunalError};
use tribunal::health::health_router;
use tribunal::service::ReportService;
use tribunal::web;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // RUST_LOG overrides the default, e.g. RUST_LOG=tribunal=debug
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Tribunal starting...");

    let config = TribunalConfig::from_env()?;
    tracing::info!(
        reasons = config.reasons.codes().len(),
        default_page_size = config.default_page_size,
        max_page_size = config.max_page_size,
        "Configuration loaded"
    );

    let db = Arc::new(Database::new(&config.database_path).await?);
    tracing::info!(path = %config.database_path, "Database initialized");

    let directory = Arc::new(SqliteDirectory::new(db.clone()));
    let service = Arc::new(ReportService::new(
        db.clone(),
        directory.clone(),
        directory,
        config.reasons.clone(),
    ));

    let router = web::build_router(web::AppState {
        service,
        default_page_size: config.default_page_size,
        max_page_size: config.max_page_size,
    })
    .merge(health_router(db));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.web_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TribunalError::Io(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(port = config.web_port, "Starting web server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| TribunalError::Io(format!("Web server error: {}", e)))?;

    tracing::info!("Tribunal stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
