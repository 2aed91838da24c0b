use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings created (conflict check passed).
pub const BOOKINGS_CREATED_TOTAL: &str = "venued_bookings_created_total";

/// Counter: bookings approved by the orchestrator.
pub const BOOKINGS_APPROVED_TOTAL: &str = "venued_bookings_approved_total";

/// Counter: bookings cancelled (manager or sibling cancellation).
pub const BOOKINGS_CANCELLED_TOTAL: &str = "venued_bookings_cancelled_total";

/// Counter: conflict-check rejections.
pub const CONFLICTS_REJECTED_TOTAL: &str = "venued_conflicts_rejected_total";

/// Counter: payments recorded.
pub const PAYMENTS_RECORDED_TOTAL: &str = "venued_payments_recorded_total";

/// Counter: deposits fulfilled within their window.
pub const DEPOSITS_FULFILLED_TOTAL: &str = "venued_deposits_fulfilled_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: venues currently loaded.
pub const VENUES_ACTIVE: &str = "venued_venues_active";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "venued_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (commits per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "venued_journal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if
/// `port` is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install a `tracing` subscriber honoring `RUST_LOG`. Safe to call more
/// than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
