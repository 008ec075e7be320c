//! Prometheus metrics for fetches, publishes and cycles.
//!
//! Recording is a no-op until an exporter is installed, so library code
//! and tests can call these helpers unconditionally.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

pub const FETCH_REQUESTS: &str = "metar_fetch_requests_total";
pub const FETCH_RETRIES: &str = "metar_fetch_retries_total";
pub const PUBLISH_TOTAL: &str = "metar_publish_total";
pub const PUBLISH_RETRIES: &str = "metar_publish_retries_total";
pub const CYCLE_PUBLISHED: &str = "metar_cycle_published";
pub const CYCLE_TOTAL: &str = "metar_cycle_total";
pub const CYCLE_DURATION: &str = "metar_cycle_duration_seconds";

/// Install the Prometheus exporter with its own HTTP listener.
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;
    info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

/// One upstream weather request, `kind` being "metar" or "taf".
pub fn record_fetch(kind: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(FETCH_REQUESTS, "kind" => kind, "outcome" => outcome).increment(1);
}

/// A retry scheduled by the backoff loop for `operation`.
pub fn record_retry(operation: &'static str) {
    if operation.starts_with("publish") {
        counter!(PUBLISH_RETRIES).increment(1);
    } else {
        counter!(FETCH_RETRIES, "operation" => operation).increment(1);
    }
}

/// Final outcome of one entity publish: "success", "failure", "unauthorized" or "skipped".
pub fn record_publish(outcome: &'static str) {
    counter!(PUBLISH_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_cycle(published: usize, total: usize, elapsed: Duration) {
    gauge!(CYCLE_PUBLISHED).set(published as f64);
    gauge!(CYCLE_TOTAL).set(total as f64);
    histogram!(CYCLE_DURATION).record(elapsed.as_secs_f64());
}
