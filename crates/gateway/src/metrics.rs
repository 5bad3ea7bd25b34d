//! Gateway metrics using native Prometheus client.
//!
//! Metrics are domain-specific rather than generic event counters.
//! Use traces for event-level granularity during investigations.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Gauge, HistogramVec,
};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Domain-specific metrics for gateway monitoring.
pub struct Metrics {
    // === Node calls ===
    pub node_calls: CounterVec,
    pub node_call_latency: HistogramVec,

    // === Submissions ===
    pub submissions: CounterVec,

    // === Connection ===
    pub connection_ready: Gauge,
}

impl Metrics {
    fn new() -> Self {
        // Latency buckets: 1ms to 60s
        let latency_buckets = vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ];

        Self {
            // Node calls
            node_calls: register_counter_vec!(
                "nodegate_node_calls_total",
                "Total mini-protocol calls issued to the node",
                &["operation", "outcome"]
            )
            .unwrap(),
            node_call_latency: register_histogram_vec!(
                "nodegate_node_call_latency_seconds",
                "Latency of mini-protocol calls against the node",
                &["operation"],
                latency_buckets
            )
            .unwrap(),

            // Submissions
            submissions: register_counter_vec!(
                "nodegate_submissions_total",
                "Total transaction submissions by verdict",
                &["verdict"]
            )
            .unwrap(),

            // Connection
            connection_ready: register_gauge!(
                "nodegate_connection_ready",
                "Whether the node connection is ready (1) or not (0)"
            )
            .unwrap(),
        }
    }
}

/// Get or initialize the global metrics instance.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Record a completed node call.
///
/// **Cardinality control**: `outcome` must be `"ok"` or one of the error
/// kinds (`"state_contract"`, `"timeout_queued"`, `"timeout_in_flight"`,
/// `"transport"`, `"connection_lost"`). Do NOT use dynamic strings.
pub fn record_node_call(operation: &str, outcome: &str, latency_secs: f64) {
    debug_assert!(
        matches!(
            outcome,
            "ok" | "state_contract"
                | "timeout_queued"
                | "timeout_in_flight"
                | "transport"
                | "connection_lost"
        ),
        "Unknown call outcome: {} - add to allowed list or use existing",
        outcome
    );
    let m = metrics();
    m.node_calls
        .with_label_values(&[operation, outcome])
        .inc();
    m.node_call_latency
        .with_label_values(&[operation])
        .observe(latency_secs);
}

/// Record a submission verdict from the node.
pub fn record_submission(accepted: bool) {
    let verdict = if accepted { "accepted" } else { "rejected" };
    metrics()
        .submissions
        .with_label_values(&[verdict])
        .inc();
}

/// Update the connection readiness gauge.
pub fn set_connection_ready(ready: bool) {
    metrics()
        .connection_ready
        .set(if ready { 1.0 } else { 0.0 });
}
