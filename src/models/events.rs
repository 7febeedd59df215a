use serde::{Deserialize, Serialize};

use crate::models::history::{LogKind, LogLine};
use crate::models::process::MergedProcess;

/// 推送给观察者的消息
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    ProcessesUpdate(Vec<MergedProcess>),
    LogLine(LogLine),
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

/// 观察者发来的命令
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientCommand {
    StartMonitoring,
    StopMonitoring,
    StartLogStream {
        #[serde(rename = "processId")]
        process_id: u32,
        #[serde(default)]
        kind: LogKind,
    },
    StopLogStream,
}
