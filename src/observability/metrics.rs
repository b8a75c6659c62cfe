//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound requests by source mode and status
//! - `gateway_authorization_denied_total` (counter): rejected messages by source
//! - `gateway_endpoint_failures_total` (counter): handler errors and panics by endpoint
//! - `gateway_redeliveries_total` (counter): redelivery attempts by outcome
//! - `gateway_retry_records_persisted_total` (counter): failed transmissions written to disk
//! - `gateway_transmissions_total` (counter): outbound transmissions by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Prometheus exposition on a dedicated listener

use std::net::SocketAddr;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Metrics server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install metrics recorder: {0}")]
    Recorder(#[from] BuildError),

    #[error("metrics server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn record_request(mode: &'static str, status: u16) {
    metrics::counter!(
        "gateway_requests_total",
        "mode" => mode,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_authorization_denied(source: &str) {
    metrics::counter!("gateway_authorization_denied_total", "source" => source.to_string()).increment(1);
}

pub fn record_endpoint_failure(endpoint: &str) {
    metrics::counter!("gateway_endpoint_failures_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_redelivery(outcome: &'static str) {
    metrics::counter!("gateway_redeliveries_total", "outcome" => outcome).increment(1);
}

pub fn record_retry_persisted() {
    metrics::counter!("gateway_retry_records_persisted_total").increment(1);
}

pub fn record_transmission(outcome: &'static str) {
    metrics::counter!("gateway_transmissions_total", "outcome" => outcome).increment(1);
}
