//! Prometheus metrics exposition
//!
//! The gateway installs the global recorder, so the session counters emitted
//! by `session-core` render alongside its own:
//!
//! - `session_gateway_requests_total` (counter): labels `status`, `method`
//! - `session_gateway_request_duration_seconds` (histogram): label `status`
//! - `session_gateway_upstream_errors_total` (counter): label `error_type`

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "session_gateway_request_duration_seconds";

/// 5ms to 60s, covering the configurable request timeout range.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> anyhow::Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .context("invalid histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record a completed gateway request.
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status = status.to_string();
    metrics::counter!(
        "session_gateway_requests_total",
        "status" => status.clone(),
        "method" => method.to_string()
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "status" => status).record(duration_secs);
}

/// Record a request that failed without an upstream response to return.
pub fn record_upstream_error(error_type: &'static str) {
    metrics::counter!("session_gateway_upstream_errors_total", "error_type" => error_type)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request(200, "GET", 0.05);
        record_upstream_error("timeout");
    }

    #[test]
    fn request_metrics_render_as_histogram() {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(200, "GET", 0.042);
        record_request(401, "POST", 0.2);
        record_upstream_error("session_expired");

        let output = handle.render();
        assert!(output.contains("session_gateway_requests_total"));
        assert!(output.contains("status=\"401\""));
        assert!(output.contains("method=\"POST\""));
        assert!(output.contains("session_gateway_request_duration_seconds_bucket"));
        assert!(output.contains("le=\"60\""));
        assert!(output.contains("error_type=\"session_expired\""));
    }
}
