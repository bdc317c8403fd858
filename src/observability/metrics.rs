//! Metrics collection and exposition.
//!
//! # Metrics
//! - `node_subsystem_starts_total` (counter): startup outcomes by subsystem
//! - `node_subsystem_stops_total` (counter): shutdown results by cleanup action
//! - `node_block_height` (gauge): last height committed by the in-process engine
//! - `node_commit_retries_total` (counter): heights the application failed to commit
//!
//! # Design Decisions
//! - Updates are cheap no-ops until a recorder is installed
//! - The Prometheus recorder is installed only when telemetry is enabled and
//!   rendered by the API server at `/metrics`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Record the outcome of a subsystem start.
pub fn record_start(subsystem: &str, outcome: &'static str) {
    metrics::counter!(
        "node_subsystem_starts_total",
        "subsystem" => subsystem.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record the result of a cleanup action.
pub fn record_stop(subsystem: &str, ok: bool) {
    metrics::counter!(
        "node_subsystem_stops_total",
        "subsystem" => subsystem.to_string(),
        "result" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

/// Record the latest committed height.
pub fn record_block_height(height: u64) {
    metrics::gauge!("node_block_height").set(height as f64);
}

pub fn record_commit_failure() {
    metrics::counter!("node_commit_retries_total").increment(1);
}

/// Install the global Prometheus recorder.
///
/// Only one recorder can exist per process; a second call logs and returns `None`.
pub fn install_prometheus() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            tracing::info!("Prometheus recorder installed");
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}
