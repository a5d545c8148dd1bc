//! Prometheus metrics for the generation path.
//!
//! Counters are labeled by API key id so per-key consumption can be graphed
//! without touching the database.

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::{Error, Result};
use crate::types::TokenUsage;

/// Metrics prefix for all exported series.
pub const METRICS_PREFIX: &str = "fortress";

/// Histogram buckets for generation latency (in seconds). The low end
/// mirrors the analytics buckets; the high end covers slow model calls.
pub const GENERATION_LATENCY_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.200, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 180.0,
];

/// Installs the global Prometheus recorder and returns the handle that the
/// `/metrics` endpoint renders from. Call once at startup.
pub fn install() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(format!("{METRICS_PREFIX}_generation_duration_seconds")),
            GENERATION_LATENCY_BUCKETS,
        )
        .map_err(|e| Error::Config(format!("invalid metrics buckets: {e}")))?
        .install_recorder()
        .map_err(|e| Error::Config(format!("failed to install metrics recorder: {e}")))?;

    register_metrics();
    Ok(handle)
}

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{METRICS_PREFIX}_generation_attempts_total"),
        Unit::Count,
        "Generation attempts with a valid key, regardless of outcome"
    );
    describe_counter!(
        format!("{METRICS_PREFIX}_generation_requests_total"),
        Unit::Count,
        "Completed generation requests"
    );
    describe_counter!(
        format!("{METRICS_PREFIX}_generation_errors_total"),
        Unit::Count,
        "Failed generation requests"
    );
    describe_counter!(
        format!("{METRICS_PREFIX}_prompt_tokens_total"),
        Unit::Count,
        "Prompt tokens consumed"
    );
    describe_counter!(
        format!("{METRICS_PREFIX}_completion_tokens_total"),
        Unit::Count,
        "Completion tokens produced"
    );
    describe_counter!(
        format!("{METRICS_PREFIX}_tokens_total"),
        Unit::Count,
        "Total tokens processed"
    );
    describe_histogram!(
        format!("{METRICS_PREFIX}_generation_duration_seconds"),
        Unit::Seconds,
        "End-to-end generation latency in seconds"
    );
}

/// Counted before the upstream call so attempts and outcomes can diverge.
pub fn record_generation_attempt(api_key_id: &str) {
    counter!(
        format!("{METRICS_PREFIX}_generation_attempts_total"),
        "api_key_id" => api_key_id.to_string()
    )
    .increment(1);
}

/// Record one completed generation call.
pub fn record_generation(api_key_id: &str, usage: &TokenUsage, duration_secs: f64) {
    let key = api_key_id.to_string();

    counter!(
        format!("{METRICS_PREFIX}_generation_requests_total"),
        "api_key_id" => key.clone()
    )
    .increment(1);

    counter!(
        format!("{METRICS_PREFIX}_prompt_tokens_total"),
        "api_key_id" => key.clone()
    )
    .increment(usage.prompt_tokens.max(0) as u64);

    counter!(
        format!("{METRICS_PREFIX}_completion_tokens_total"),
        "api_key_id" => key.clone()
    )
    .increment(usage.completion_tokens.max(0) as u64);

    counter!(
        format!("{METRICS_PREFIX}_tokens_total"),
        "api_key_id" => key.clone()
    )
    .increment(usage.total_tokens.max(0) as u64);

    histogram!(
        format!("{METRICS_PREFIX}_generation_duration_seconds"),
        "api_key_id" => key
    )
    .record(duration_secs);
}

/// Record a failed generation call, labeled by failure kind.
pub fn record_generation_error(api_key_id: &str, kind: &str) {
    counter!(
        format!("{METRICS_PREFIX}_generation_errors_total"),
        "api_key_id" => api_key_id.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}
