//! # vpnsub — Binary Entry Point
//!
//! Connects the ledger, builds the panel client, starts the reconciliation
//! loop and serves the API until Ctrl-C.

use std::sync::Arc;

use vpnsub_api::state::{AppConfig, AppState};
use vpnsub_engine::{EngineConfig, Provisioner, Reconciler};
use vpnsub_ledger::Ledger;
use vpnsub_panel_client::{PanelClient, PanelConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG wins; LOG_LEVEL is the short form.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        tracing_subscriber::EnvFilter::try_new(level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;
    let panel_config = PanelConfig::from_env()?;
    let engine_config = EngineConfig::from_env()?;
    tracing::info!(?config, ?panel_config, "configuration loaded");

    let ledger = Ledger::connect(&config.database_url).await.map_err(|e| {
        tracing::error!("Ledger initialization failed: {e}");
        e
    })?;
    let panel = PanelClient::new(panel_config)?;

    let reconciler = Reconciler::new(ledger.clone(), panel.clone(), engine_config.watch_interval).spawn();
    let provisioner = Provisioner::new(ledger.clone(), panel, Arc::new(engine_config));

    let port = config.port;
    let app = vpnsub_api::app(AppState::new(config, provisioner));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("vpnsub API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped; stopping reconciler");
    reconciler.shutdown().await;
    ledger.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl-C: {e}");
    }
}
