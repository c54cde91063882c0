//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain reachability
//! - Balances found and filtered per chain
//! - Chain pipeline outcomes
//! - Protocol request counts and latency

use crate::engine::ChainStatus;

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "intent_engine_chain_connected",
        "Chain reachability (1=reachable, 0=unreachable)",
        &["chain_id"]
    ).unwrap();

    pub static ref CHAIN_OUTCOMES: CounterVec = register_counter_vec!(
        "intent_engine_chain_outcomes_total",
        "Chain pipelines processed by outcome",
        &["chain_id", "outcome"]
    ).unwrap();

    // Balance metrics
    pub static ref TOKENS_FOUND: CounterVec = register_counter_vec!(
        "intent_engine_tokens_found_total",
        "Non-zero balances found by scans",
        &["chain_id"]
    ).unwrap();

    pub static ref TOKENS_FILTERED: CounterVec = register_counter_vec!(
        "intent_engine_tokens_filtered_total",
        "Balances dropped as dust",
        &["chain_id"]
    ).unwrap();

    // Protocol metrics
    pub static ref PROTOCOL_REQUESTS: CounterVec = register_counter_vec!(
        "intent_engine_protocol_requests_total",
        "Protocol requests by endpoint and outcome",
        &["endpoint", "outcome"]
    ).unwrap();

    pub static ref PROTOCOL_LATENCY: HistogramVec = register_histogram_vec!(
        "intent_engine_protocol_latency_seconds",
        "Protocol request latency",
        &["endpoint"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();
}

/// Text exposition of every registered metric
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_chain_outcome(chain_id: u64, status: ChainStatus) {
    let outcome = match status {
        ChainStatus::Succeeded => "succeeded",
        ChainStatus::Failed => "failed",
        ChainStatus::Skipped => "skipped",
    };
    CHAIN_OUTCOMES
        .with_label_values(&[&chain_id.to_string(), outcome])
        .inc();
}

pub fn record_tokens_found(chain_id: u64, count: usize) {
    TOKENS_FOUND
        .with_label_values(&[&chain_id.to_string()])
        .inc_by(count as f64);
}

pub fn record_tokens_filtered(chain_id: u64, count: usize) {
    TOKENS_FILTERED
        .with_label_values(&[&chain_id.to_string()])
        .inc_by(count as f64);
}

pub fn record_protocol_request(endpoint: &str, outcome: &str) {
    PROTOCOL_REQUESTS
        .with_label_values(&[endpoint, outcome])
        .inc();
}

pub fn record_protocol_latency(endpoint: &str, latency_secs: f64) {
    PROTOCOL_LATENCY
        .with_label_values(&[endpoint])
        .observe(latency_secs);
}
