use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "weekslot_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "weekslot_query_duration_seconds";

/// Counter: creates/updates rejected because they overlap a same-day record.
pub const INTERVAL_CONFLICTS_TOTAL: &str = "weekslot_interval_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "weekslot_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "weekslot_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "weekslot_connections_rejected_total";

/// Gauge: number of loaded schedules (one per database name).
pub const TENANTS_ACTIVE: &str = "weekslot_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "weekslot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "weekslot_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::CreateRecord { .. } => "create_record",
        Command::UpdateRecord { .. } => "update_record",
        Command::DeleteRecord { .. } => "delete_record",
        Command::SelectRecords { .. } => "select_records",
        Command::SelectSchedule { .. } => "select_schedule",
        Command::SelectWeeklySchedule => "select_weekly_schedule",
    }
}
