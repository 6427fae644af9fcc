use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: slot resolutions served.
pub const RESOLUTIONS_TOTAL: &str = "bookable_resolutions_total";

/// Histogram: slot resolution latency in seconds.
pub const RESOLUTION_DURATION_SECONDS: &str = "bookable_resolution_duration_seconds";

/// Histogram: free slots returned per resolution.
pub const SLOTS_RETURNED: &str = "bookable_slots_returned";

/// Counter: bookings committed.
pub const BOOKINGS_TOTAL: &str = "bookable_bookings_total";

/// Counter: booking attempts rejected by the overlap check.
pub const BOOKING_CONFLICTS_TOTAL: &str = "bookable_booking_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "bookable_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "bookable_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "bookable_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
