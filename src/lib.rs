pub mod api;
pub mod config;
pub mod core;
pub mod metrics;
pub mod registry;
pub mod sources;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::registry::TraceRegistry;
use crate::sources::EventHub;

/// Set up the global tracing subscriber. `level` comes from LOG_LEVEL and
/// accepts anything EnvFilter does ("info", "trace_indexer=debug", ...).
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wires the event hub, trace registry and HTTP surface together and serves
/// until Ctrl+C. Trace assembly feeds the registry from outside this crate;
/// an empty node still answers /health and streams nothing.
pub async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let hub = Arc::new(EventHub::new(256));
    let registry = Arc::new(TraceRegistry::new(hub.clone()));

    tokio::spawn(metrics::serve(config.metrics_addr));

    let router = api::router(registry, hub, config.clone());
    info!("starting API server on {}", config.api_addr);
    axum::Server::bind(&config.api_addr)
        .serve(router.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("API server exited")?;
    Ok(())
}
