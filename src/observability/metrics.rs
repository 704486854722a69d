//! Metrics collection and exposition.
//!
//! # Metrics
//! - `armigate_decisions_total` (counter): scoring exchanges by outcome
//! - `armigate_decision_duration_seconds` (histogram): exchange latency by outcome
//! - `armigate_bypass_total` (counter): requests never sent, by filter
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed, so the library never requires an exporter

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed scoring exchange.
pub fn record_decision(outcome: &'static str, started: Instant) {
    counter!("armigate_decisions_total", "outcome" => outcome).increment(1);
    histogram!("armigate_decision_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

/// Record a request that skipped the scoring API.
pub fn record_bypass(reason: &'static str) {
    counter!("armigate_bypass_total", "reason" => reason).increment(1);
}
