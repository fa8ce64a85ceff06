/// Metrics and telemetry for the Plaza server
///
/// Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Moderation, appeal, and punishment activity
/// - Audit log and channel event volume
use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter_vec, Encoder, Gauge,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Workflow Metrics ==========

    /// Content reports by category
    pub static ref MODERATION_REPORTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "moderation_reports_total",
        "Total number of content reports",
        &["category"]
    )
    .unwrap();

    /// Moderation decisions by event
    pub static ref MODERATION_DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "moderation_decisions_total",
        "Total number of moderation decisions",
        &["event"]
    )
    .unwrap();

    /// Appeals by outcome
    pub static ref APPEALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "appeals_total",
        "Total number of appeal submissions and outcomes",
        &["outcome"]
    )
    .unwrap();

    /// Punishments applied by kind
    pub static ref PUNISHMENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "punishments_total",
        "Total number of punishments applied",
        &["kind"]
    )
    .unwrap();

    // ========== Ledger Metrics ==========

    /// Audit log entries by action type
    pub static ref AUDIT_ENTRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "audit_entries_total",
        "Total number of audit log entries written",
        &["action"]
    )
    .unwrap();

    /// Channel events published by type
    pub static ref CHANNEL_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "channel_events_total",
        "Total number of channel events published",
        &["event_type"]
    )
    .unwrap();

    // ========== Process Metrics ==========

    /// Server uptime in seconds
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "uptime_seconds",
        "Server uptime in seconds"
    )
    .unwrap();
}

/// Encode the full registry as Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Spawn the uptime ticker
pub fn start_uptime_ticker() {
    let started = std::time::Instant::now();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(15));
        loop {
            interval.tick().await;
            UPTIME_SECONDS.set(started.elapsed().as_secs_f64());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_registered_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .inc();
        MODERATION_REPORTS_TOTAL.with_label_values(&["spam"]).inc();

        let text = gather();
        assert!(text.contains("http_requests_total"));
        assert!(text.contains("moderation_reports_total"));
    }
}
