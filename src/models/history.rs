use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 日志流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stdout" => Some(StreamKind::Stdout),
            "stderr" => Some(StreamKind::Stderr),
            _ => None,
        }
    }
}

/// 观察者请求的日志范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Stdout,
    Stderr,
    #[default]
    Both,
}

impl LogKind {
    pub fn includes(&self, stream: StreamKind) -> bool {
        match self {
            LogKind::Both => true,
            LogKind::Stdout => stream == StreamKind::Stdout,
            LogKind::Stderr => stream == StreamKind::Stderr,
        }
    }
}

/// 指标采样，只追加不修改
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub process_id: u32,
    pub cpu: f32,
    pub memory: u64,
    pub timestamp: DateTime<Utc>,
}

/// 日志行，只追加不修改
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub process_id: u32,
    pub kind: StreamKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

pub const DEFAULT_METRIC_LIMIT: usize = 100;
pub const DEFAULT_LOG_LIMIT: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct MetricQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// 子串过滤（区分大小写）
    pub keyword: Option<String>,
    pub limit: Option<usize>,
}
