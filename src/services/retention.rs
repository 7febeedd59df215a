use log::{debug, info};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::metrics::METRICS;
use crate::store::ConfigStore;

pub const DEFAULT_METRIC_RETENTION_DAYS: u32 = 7;
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub metric_days: u32,
    pub log_days: u32,
    pub interval: Duration,
}

/// 执行一次过期清理，返回 (指标行数, 日志行数)
pub async fn purge_once(store: &ConfigStore, policy: &RetentionPolicy) -> (usize, usize) {
    let metrics = store.purge_metrics_older_than(policy.metric_days).await;
    let logs = store.purge_logs_older_than(policy.log_days).await;

    METRICS
        .rows_purged
        .with_label_values(&["metric_samples"])
        .inc_by(metrics as f64);
    METRICS
        .rows_purged
        .with_label_values(&["log_lines"])
        .inc_by(logs as f64);

    if metrics > 0 || logs > 0 {
        info!("🧹 Purged {} metric samples and {} log lines", metrics, logs);
    } else {
        debug!("Retention pass: nothing to purge");
    }
    (metrics, logs)
}

pub fn spawn_retention_task(store: ConfigStore, policy: RetentionPolicy) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            purge_once(&store, &policy).await;
        }
    })
}
