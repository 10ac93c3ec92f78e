use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── Ordering flow ───────────────────────────────────────────────

/// Counter: orders booked. Labels: location.
pub const ORDERS_PLACED_TOTAL: &str = "kitchen_orders_placed_total";

/// Counter: availability answers with no slot left today. Labels: location.
pub const NO_SLOT_TOTAL: &str = "kitchen_no_slot_total";

/// Histogram: slot scan duration in seconds.
pub const SLOT_SEARCH_DURATION_SECONDS: &str = "kitchen_slot_search_duration_seconds";

// ── Reconciliation loops ────────────────────────────────────────

/// Counter: escalator runs (one per minute transition).
pub const ESCALATION_TICKS_TOTAL: &str = "kitchen_escalation_ticks_total";

/// Counter: system blockers created. Labels: location.
pub const BLOCKERS_CREATED_TOTAL: &str = "kitchen_blockers_created_total";

/// Gauge: blocking level reached today. Labels: location.
pub const BLOCKING_LEVEL: &str = "kitchen_blocking_level";

/// Counter: overdue orders moved to a new pickup minute.
pub const ORDERS_REBOOKED_TOTAL: &str = "kitchen_orders_rebooked_total";

/// Histogram: passes used by one rebooker run.
pub const REBOOK_PASSES: &str = "kitchen_rebook_passes";

/// Counter: ticks deferred because the order store failed. Labels: task.
pub const STORE_ERRORS_TOTAL: &str = "kitchen_store_errors_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
