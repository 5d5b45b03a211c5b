//! Prometheus metrics recorder.

use anyhow::Result;
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Latency buckets for `http_requests_duration_seconds`
const EXPONENTIAL_SECONDS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the global prometheus recorder and describe the server's metrics.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_requests_duration_seconds".to_string()),
            EXPONENTIAL_SECONDS,
        )?
        .install_recorder()?;

    describe_counter!(
        "verification_codes_issued_total",
        "Verification codes persisted, by trigger"
    );
    describe_counter!(
        "verification_attempts_total",
        "Submitted verification codes, by outcome"
    );
    describe_counter!("sign_ups_total", "Accounts created");
    describe_counter!("http_requests_total", "HTTP requests served");
    describe_histogram!(
        "http_requests_duration_seconds",
        Unit::Seconds,
        "HTTP request latency"
    );

    Ok(handle)
}
