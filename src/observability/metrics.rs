//! Metrics collection and exposition.

use std::sync::OnceLock;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder once per process and return a render
/// handle. Subsequent calls return the same handle.
pub fn handle() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// Record one finished request.
pub fn record_response(code: u16, duration_ms: u64) {
    counter!("responses_codes", "code" => code.to_string()).increment(1);
    histogram!("request_duration_seconds").record(duration_ms as f64 / 1000.0);
}

/// Track how many workers are currently serving.
pub fn record_workers_online(count: usize) {
    gauge!("workers_online").set(count as f64);
}

/// Count routing-table replacements.
pub fn record_table_update() {
    counter!("routing_table_updates_total").increment(1);
}
