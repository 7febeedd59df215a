use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::services::log_tailer::DEFAULT_TAIL_LINES;
use crate::services::retention::{DEFAULT_LOG_RETENTION_DAYS, DEFAULT_METRIC_RETENTION_DAYS};
use crate::services::session::DEFAULT_POLL_INTERVAL;

/// 进程来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SupervisorKind {
    /// 通过 PM2 命令行
    Pm2,
    /// 本机进程表 + 日志文件
    Local,
}

/// PM Dashboard - 进程监控与日志推送服务
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// HTTP API 监听端口
    #[arg(short, long, env = "PORT", default_value_t = 9999)]
    pub port: u16,

    /// 监听地址
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "0.0.0.0")]
    pub address: String,

    /// WebSocket 监听端口
    #[arg(long, env = "WS_PORT", default_value_t = 9998)]
    pub ws_port: u16,

    /// SQLite 配置库路径
    #[arg(long, env = "DATABASE_PATH", default_value = "data/dashboard.db")]
    pub database: PathBuf,

    /// 配置库不可用时使用的 JSON 文件
    #[arg(long, env = "FALLBACK_FILE", default_value = "data/fallback.json")]
    pub fallback_file: PathBuf,

    /// 轮询间隔（毫秒）
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// 开始日志流时回放的历史行数
    #[arg(long, env = "TAIL_LINES", default_value_t = DEFAULT_TAIL_LINES as u64,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub tail_lines: u64,

    /// 指标采样保留天数
    #[arg(long, env = "METRIC_RETENTION_DAYS", default_value_t = DEFAULT_METRIC_RETENTION_DAYS)]
    pub metric_retention_days: u32,

    /// 日志保留天数
    #[arg(long, env = "LOG_RETENTION_DAYS", default_value_t = DEFAULT_LOG_RETENTION_DAYS)]
    pub log_retention_days: u32,

    /// 清理任务间隔（秒）
    #[arg(long, env = "PURGE_INTERVAL_SECS", default_value_t = 3600,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub purge_interval_secs: u64,

    #[arg(long, env = "SUPERVISOR", value_enum, default_value_t = SupervisorKind::Pm2)]
    pub supervisor: SupervisorKind,

    /// pm2 可执行文件
    #[arg(long, env = "PM2_BIN", default_value = "pm2")]
    pub pm2_bin: String,

    /// local 模式下的进程列表
    #[arg(long, env = "PROCESSES_FILE", default_value = "processes.json")]
    pub processes_file: PathBuf,
}

impl CommandArgs {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}
