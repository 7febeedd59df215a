use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 进程运行状态（由 supervisor 上报）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Online,
    Stopped,
    Errored,
    Restarting,
    Unknown,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Online => "online",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Errored => "errored",
            ProcessStatus::Restarting => "restarting",
            ProcessStatus::Unknown => "unknown",
        }
    }
}

/// 单次轮询得到的进程快照
///
/// 每个周期重新获取，不整体落库；只有 (id, cpu, memory) 会被采样进历史表。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    /// supervisor 分配的进程编号
    pub id: u32,
    pub name: String,
    /// 操作系统 PID（未运行时为空）
    pub pid: Option<u32>,
    pub status: ProcessStatus,
    /// CPU 使用率 (百分比)
    pub cpu: f32,
    /// 常驻内存 (字节)
    pub memory: u64,
    /// 本次启动时间
    pub uptime: Option<DateTime<Utc>>,
    pub restarts: u32,
    pub script_path: Option<String>,
    pub cwd: Option<String>,
    pub out_log_path: Option<PathBuf>,
    pub err_log_path: Option<PathBuf>,
}

impl ProcessSnapshot {
    pub fn is_online(&self) -> bool {
        self.status == ProcessStatus::Online
    }
}

/// 重启策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartPolicy {
    pub auto_restart: bool,
    pub max_restarts: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            auto_restart: true,
            max_restarts: 15,
        }
    }
}

/// 配置库中保存的单个进程配置
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessConfig {
    pub process_id: u32,
    pub group_id: Option<i64>,
    #[serde(flatten)]
    pub restart_policy: RestartPolicy,
}

/// 推送给观察者的合并视图
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedProcess {
    #[serde(flatten)]
    pub snapshot: ProcessSnapshot,
    pub group_id: Option<i64>,
    #[serde(flatten)]
    pub restart_policy: RestartPolicy,
}
