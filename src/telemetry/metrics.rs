//! Prometheus metrics setup and metric definitions

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    // Backend round trips dominate, so the buckets reach further than the defaults
    let buckets = vec![
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(&buckets)
        .context("failed to set histogram buckets")?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Register metric descriptions and emit initial zero values so Prometheus output
/// includes HELP/TYPE lines for all metrics from startup.
pub fn describe_metrics() {
    describe_counter!("gateway_http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "gateway_http_request_duration_seconds",
        "HTTP request duration in seconds, backend time included"
    );
    describe_gauge!(
        "gateway_http_requests_in_flight",
        "Number of HTTP requests currently being processed"
    );
    describe_counter!(
        "gateway_forwarded_requests_total",
        "Requests sent to a backend service, by outcome (ok/timeout/unreachable)"
    );
    describe_counter!(
        "gateway_auth_rejections_total",
        "Requests rejected by the credential check, by reason"
    );

    gauge!("gateway_http_requests_in_flight").set(0.0);
    for service in ["user", "payment"] {
        counter!("gateway_forwarded_requests_total", "service" => service, "outcome" => "ok")
            .absolute(0);
    }
    for reason in ["missing", "expired", "invalid"] {
        counter!("gateway_auth_rejections_total", "reason" => reason).absolute(0);
    }
}
