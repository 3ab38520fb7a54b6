//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use blindchat_core::pairing::ConnectOutcome;

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))
}

/// Record the result of a connect (or the connect half of a next).
pub fn record_connect(outcome: &ConnectOutcome) {
    let result = match outcome {
        ConnectOutcome::Paired { .. } => "paired",
        ConnectOutcome::Waiting => "waiting",
        ConnectOutcome::AlreadyConnected => "already_connected",
    };
    metrics::counter!("pairing_connects_total", "result" => result).increment(1);
}

/// Record a relayed message by payload kind.
pub fn record_relay(kind: &'static str) {
    metrics::counter!("relay_messages_total", "kind" => kind).increment(1);
}

pub fn record_error(kind: &'static str) {
    metrics::counter!("errors_total", "kind" => kind).increment(1);
}

pub fn set_pool_size(waiting: usize) {
    metrics::gauge!("waiting_pool_size").set(waiting as f64);
}
