// src/metrics.rs
// Prometheus exposition, served on its own listener.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "http_requests_total",
        "HTTP requests by method, path and status",
        &["method", "path", "status"]
    )
    .expect("register http_requests_total")
});

pub static HTTP_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latency by method and path",
        &["method", "path"]
    )
    .expect("register http_request_duration_seconds")
});

pub static OPEN_STREAMS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "push_open_streams",
        "Currently open SSE and websocket streams"
    )
    .expect("register push_open_streams")
});

pub static TRACES_STORED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("indexer_traces_stored_total", "Traces put into the registry")
        .expect("register indexer_traces_stored_total")
});

pub static ENRICHMENT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "indexer_enrichment_failures_total",
        "Trace enrichment runs aborted by an information source error"
    )
    .expect("register indexer_enrichment_failures_total")
});

/// RAII counter for long-lived connections; drop closes the accounting.
pub struct StreamGuard;

impl StreamGuard {
    pub fn new() -> Self {
        OPEN_STREAMS.inc();
        StreamGuard
    }
}

impl Default for StreamGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        OPEN_STREAMS.dec();
    }
}

pub fn render() -> prometheus::Result<Vec<u8>> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
    Ok(buf)
}

async fn metrics_handler() -> impl IntoResponse {
    match render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            tracing::error!("failed to encode metrics: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serves `/metrics` until the process exits. Spawned from `run()`.
pub async fn serve(addr: SocketAddr) {
    let router = Router::new().route("/metrics", get(metrics_handler));
    tracing::info!("metrics listening on {}", addr);
    if let Err(err) = axum::Server::bind(&addr)
        .serve(router.into_make_service())
        .await
    {
        tracing::error!("metrics server exited: {}", err);
    }
}
