use prometheus::{
    Encoder, Gauge, CounterVec, Counter, Opts, Registry, TextEncoder,
    register_gauge_with_registry, register_counter_with_registry, register_counter_vec_with_registry,
};
use lazy_static::lazy_static;
use std::sync::Arc;

/// dashboard 自身的运行指标（不是被监控进程的指标）
pub struct MetricsRegistry {
    registry: Registry,

    // Gauge metrics
    pub sessions_active: Gauge,
    pub monitors_active: Gauge,
    pub log_streams_active: Gauge,

    // Counter metrics
    pub monitor_cycles: Counter,
    pub monitor_cycle_errors: Counter,
    pub log_lines_delivered: CounterVec,
    pub metric_samples_persisted: Counter,
    pub rows_purged: CounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let sessions_active = register_gauge_with_registry!(
            Opts::new("dashboard_sessions_active", "Connected observer sessions"),
            registry
        ).unwrap();

        let monitors_active = register_gauge_with_registry!(
            Opts::new("dashboard_monitors_active", "Sessions with an active monitoring loop"),
            registry
        ).unwrap();

        let log_streams_active = register_gauge_with_registry!(
            Opts::new("dashboard_log_streams_active", "Sessions with an active log stream"),
            registry
        ).unwrap();

        let monitor_cycles = register_counter_with_registry!(
            Opts::new("dashboard_monitor_cycles_total", "Snapshot-merge-push cycles executed"),
            registry
        ).unwrap();

        let monitor_cycle_errors = register_counter_with_registry!(
            Opts::new("dashboard_monitor_cycle_errors_total", "Cycles whose supervisor fetch failed"),
            registry
        ).unwrap();

        let log_lines_delivered = register_counter_vec_with_registry!(
            Opts::new("dashboard_log_lines_delivered_total", "Log lines pushed to observers"),
            &["source"],
            registry
        ).unwrap();

        let metric_samples_persisted = register_counter_with_registry!(
            Opts::new("dashboard_metric_samples_persisted_total", "Metric samples written to the config store"),
            registry
        ).unwrap();

        let rows_purged = register_counter_vec_with_registry!(
            Opts::new("dashboard_rows_purged_total", "History rows removed by retention"),
            &["table"],
            registry
        ).unwrap();

        Self {
            registry,
            sessions_active,
            monitors_active,
            log_streams_active,
            monitor_cycles,
            monitor_cycle_errors,
            log_lines_delivered,
            metric_samples_persisted,
            rows_purged,
        }
    }

    pub fn render(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

lazy_static! {
    pub static ref METRICS: Arc<MetricsRegistry> = Arc::new(MetricsRegistry::new());
}
