//! Prometheus metrics for billing-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Entitlement gate decisions by resource and outcome.
pub static GATE_DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_gate_decisions_total",
        "Entitlement gate decisions by resource and outcome",
        &["resource", "outcome"] // allowed, denied
    )
    .expect("Failed to register gate_decisions_total")
});

/// Subscription refreshes against the provider.
pub static SUBSCRIPTION_REFRESHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_subscription_refreshes_total",
        "Subscription refreshes by result",
        &["result"] // synced, skipped, failed
    )
    .expect("Failed to register subscription_refreshes_total")
});

/// Provider webhook events by type and result.
pub static WEBHOOK_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_webhook_events_total",
        "Provider webhook events by type and result",
        &["event", "result"]
    )
    .expect("Failed to register webhook_events_total")
});

/// Usage events recorded, by resource.
pub static USAGE_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_usage_events_total",
        "Usage events recorded by resource",
        &["resource"]
    )
    .expect("Failed to register usage_events_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "billing_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Provider API call duration histogram.
pub static PROVIDER_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "billing_provider_request_duration_seconds",
        "Billing provider API request duration in seconds",
        &["operation"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register provider_request_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&GATE_DECISIONS_TOTAL);
    Lazy::force(&SUBSCRIPTION_REFRESHES_TOTAL);
    Lazy::force(&WEBHOOK_EVENTS_TOTAL);
    Lazy::force(&USAGE_EVENTS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&PROVIDER_REQUEST_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
