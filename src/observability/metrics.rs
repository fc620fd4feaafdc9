//! Metrics collection and exposition.
//!
//! # Metrics
//! - `circuit_calls_total` (counter): completed guarded calls by circuit, outcome
//! - `circuit_rejections_total` (counter): calls refused by an open circuit
//! - `circuit_transitions_total` (counter): state changes by circuit, target state
//! - `circuit_store_errors_total` (counter): store operations that failed open
//! - `gateway_requests_total` (counter): gateway requests by route, status
//! - `gateway_request_duration_seconds` (histogram): gateway latency by route

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a request served by the gateway.
pub fn record_request(route: &str, status: u16, start: Instant) {
    let route = route.to_string();
    counter!("gateway_requests_total", "route" => route.clone(), "status" => status.to_string())
        .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

/// Record a completed call.
pub fn record_call(circuit: &str, failed: bool) {
    let outcome = if failed { "failure" } else { "success" };
    counter!("circuit_calls_total", "circuit" => circuit.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Record a call refused without being attempted.
pub fn record_rejection(circuit: &str) {
    counter!("circuit_rejections_total", "circuit" => circuit.to_string()).increment(1);
}

/// Record a state transition.
pub fn record_transition(circuit: &str, to: &'static str) {
    counter!("circuit_transitions_total", "circuit" => circuit.to_string(), "to" => to)
        .increment(1);
}

/// Record a store operation that failed and was degraded to "allow".
pub fn record_store_error(operation: &'static str) {
    counter!("circuit_store_errors_total", "operation" => operation).increment(1);
}
