use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations. Labels: op, status ("ok" or an error label).
pub const OPERATIONS_TOTAL: &str = "daybook_operations_total";

/// Histogram: engine operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "daybook_operation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: currently active reservations.
pub const RESERVATIONS_ACTIVE: &str = "daybook_reservations_active";

/// Counter: notices handed to the mailer. Labels: kind.
pub const NOTICES_DELIVERED_TOTAL: &str = "daybook_notices_delivered_total";

/// Counter: notices the mailer failed to deliver. Labels: kind.
pub const NOTICE_FAILURES_TOTAL: &str = "daybook_notice_failures_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "daybook_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (changes per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "daybook_journal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Record one engine operation's outcome and latency.
pub fn record_operation(op: &'static str, status: &'static str, started: std::time::Instant) {
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}
