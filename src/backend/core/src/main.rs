//! Atlas Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;

use atlas_core::{
    aggregation::ExperimentAggregator,
    api::{self, AppState},
    config::Config,
    store::{PostgresStore, ReadStore},
    telemetry::{self, SensitiveFieldRedactor},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = match std::env::var("ATLAS_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: Could not load config: {}. Using defaults.", e);
            Config::from_database_url(
                std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgres://atlas@localhost:5432/atlas".to_string()),
            )
        }),
    };

    let telemetry = telemetry::init_telemetry(&config.telemetry)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Atlas Server");

    let store = PostgresStore::connect(&config.database).await?;
    store.ping().await?;
    tracing::info!(
        database = %SensitiveFieldRedactor::global().redact_value(&config.database.url),
        max_connections = config.database.max_connections,
        "Connected to database"
    );

    let store: Arc<dyn ReadStore> = Arc::new(store);
    let aggregator = Arc::new(ExperimentAggregator::new(store.clone(), config.aggregation.clone()));
    let app = api::build_router(AppState::new(aggregator, store, telemetry.metrics));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
