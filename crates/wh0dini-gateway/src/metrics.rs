//! Prometheus metrics for the Wh0Dini gateway
//!
//! Registered in the default registry and exposed on `/metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_histogram_vec, Counter,
    CounterVec, GaugeVec, HistogramVec,
};
use tracing::warn;
use wh0dini_protocol::ErrorKind;
use wh0dini_runtime::Usage;

lazy_static! {
    // ============================================================================
    // Relay Metrics
    // ============================================================================

    /// Relay requests by mode (`complete` or `stream`)
    pub static ref RELAY_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "wh0dini_relay_requests_total",
        "Total relay requests",
        &["mode"]
    )
    .expect("relay request counter registers");

    /// Relay failures by mode and error kind
    pub static ref RELAY_ERRORS: CounterVec = register_counter_vec!(
        "wh0dini_relay_errors_total",
        "Relay failures by error kind",
        &["mode", "kind"]
    )
    .expect("relay error counter registers");

    /// Time spent waiting on the model provider
    pub static ref UPSTREAM_LATENCY: HistogramVec = register_histogram_vec!(
        "wh0dini_upstream_latency_seconds",
        "Upstream model latency in seconds",
        &["mode"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("upstream latency histogram registers");

    /// Tokens reported by the provider
    pub static ref TOKENS_TOTAL: CounterVec = register_counter_vec!(
        "wh0dini_tokens_total",
        "Total tokens reported by the provider",
        &["type"]
    )
    .expect("token counter registers");

    /// Text deltas forwarded to streaming clients
    pub static ref STREAM_DELTAS: Counter = register_counter!(
        "wh0dini_stream_deltas_total",
        "Total streamed deltas forwarded to clients"
    )
    .expect("stream delta counter registers");

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// HTTP responses by route and status code
    pub static ref HTTP_RESPONSES: CounterVec = register_counter_vec!(
        "wh0dini_http_responses_total",
        "HTTP responses by status code",
        &["path", "status"]
    )
    .expect("http response counter registers");

    // ============================================================================
    // System Metrics
    // ============================================================================

    /// Build info
    pub static ref BUILD_INFO: GaugeVec = register_gauge_vec!(
        "wh0dini_build_info",
        "Build information",
        &["version", "commit"]
    )
    .expect("build info gauge registers");
}

/// Initialize metrics with build info
pub fn init_metrics() {
    BUILD_INFO
        .with_label_values(&[
            env!("CARGO_PKG_VERSION"),
            option_env!("GIT_COMMIT_SHA").unwrap_or("unknown"),
        ])
        .set(1.0);
}

pub fn record_error(mode: &str, kind: ErrorKind) {
    RELAY_ERRORS.with_label_values(&[mode, kind.as_str()]).inc();
}

pub fn record_usage(usage: &Usage) {
    TOKENS_TOTAL
        .with_label_values(&["prompt"])
        .inc_by(f64::from(usage.prompt_tokens));
    TOKENS_TOTAL
        .with_label_values(&["completion"])
        .inc_by(f64::from(usage.completion_tokens));
}

pub fn record_response(path: &str, status: u16) {
    let status = status.to_string();
    HTTP_RESPONSES
        .with_label_values(&[path, status.as_str()])
        .inc();
}

/// Export metrics in Prometheus format
pub fn export() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %err, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
