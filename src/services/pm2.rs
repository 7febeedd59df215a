use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::SupervisorError;
use crate::models::{ProcessSnapshot, ProcessStatus};
use crate::services::supervisor::{LogEvent, LogEventStream, Supervisor};

/// 通过 PM2 命令行访问 supervisor
pub struct Pm2Supervisor {
    bin: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Pm2Process {
    pid: u32,
    name: String,
    pm_id: u32,
    monit: Pm2Monit,
    pm2_env: Pm2Env,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Pm2Monit {
    memory: u64,
    cpu: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Pm2Env {
    status: String,
    /// 毫秒时间戳
    pm_uptime: Option<i64>,
    restart_time: u32,
    pm_exec_path: Option<String>,
    pm_cwd: Option<String>,
    pm_out_log_path: Option<PathBuf>,
    pm_err_log_path: Option<PathBuf>,
}

/// `pm2 logs --json` 输出的一行
#[derive(Debug, Deserialize)]
struct Pm2LogLine {
    message: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    process_id: u32,
}

fn map_status(status: &str) -> ProcessStatus {
    match status {
        "online" => ProcessStatus::Online,
        "stopped" | "stopping" => ProcessStatus::Stopped,
        "errored" => ProcessStatus::Errored,
        "launching" | "waiting restart" => ProcessStatus::Restarting,
        _ => ProcessStatus::Unknown,
    }
}

impl From<Pm2Process> for ProcessSnapshot {
    fn from(p: Pm2Process) -> Self {
        ProcessSnapshot {
            id: p.pm_id,
            name: p.name,
            pid: (p.pid > 0).then_some(p.pid),
            status: map_status(&p.pm2_env.status),
            cpu: p.monit.cpu,
            memory: p.monit.memory,
            uptime: p
                .pm2_env
                .pm_uptime
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            restarts: p.pm2_env.restart_time,
            script_path: p.pm2_env.pm_exec_path,
            cwd: p.pm2_env.pm_cwd,
            out_log_path: p.pm2_env.pm_out_log_path,
            err_log_path: p.pm2_env.pm_err_log_path,
        }
    }
}

/// 解析 `pm2 jlist` 输出；PM2 可能在 JSON 之前打印提示信息
pub fn parse_jlist(output: &str) -> Result<Vec<ProcessSnapshot>, SupervisorError> {
    let Some(start) = output.find('[') else {
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        return Err(SupervisorError::Command {
            action: "jlist".to_string(),
            message: format!("unexpected output: {}", output.trim()),
        });
    };
    let processes: Vec<Pm2Process> = serde_json::from_str(output[start..].trim_end())?;
    Ok(processes.into_iter().map(ProcessSnapshot::from).collect())
}

/// 解析 `pm2 logs --json` 的一行，非日志事件返回 None
pub fn parse_log_event(line: &str) -> Option<LogEvent> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    let parsed: Pm2LogLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Ignoring unparsable pm2 log line: {}", e);
            return None;
        }
    };
    let is_error = match parsed.kind.as_str() {
        "out" => false,
        "err" => true,
        _ => return None,
    };
    let timestamp = parsed
        .timestamp
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(LogEvent {
        process_id: parsed.process_id,
        content: parsed.message.trim_end_matches('\n').to_string(),
        is_error,
        timestamp,
    })
}

impl Pm2Supervisor {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<String, SupervisorError> {
        let output = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SupervisorError::Command {
                action: args.first().copied().unwrap_or("pm2").to_string(),
                message: if stderr.trim().is_empty() {
                    output.status.to_string()
                } else {
                    stderr.trim().to_string()
                },
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn control(&self, action: &str, id: u32) -> Result<(), SupervisorError> {
        self.run(&[action, &id.to_string()]).await?;
        info!("✓ pm2 {} {}", action, id);
        Ok(())
    }
}

#[async_trait]
impl Supervisor for Pm2Supervisor {
    async fn list_snapshots(&self) -> Result<Vec<ProcessSnapshot>, SupervisorError> {
        let output = self.run(&["jlist"]).await?;
        parse_jlist(&output)
    }

    async fn describe(&self, id: u32) -> Result<ProcessSnapshot, SupervisorError> {
        self.list_snapshots()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or(SupervisorError::NotFound(id))
    }

    /// 启动 `pm2 logs <id> --json` 子进程；流被 drop 时子进程随之结束
    async fn subscribe_logs(&self, id: u32) -> Result<LogEventStream, SupervisorError> {
        let mut child = Command::new(&self.bin)
            .args(["logs", &id.to_string(), "--json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| SupervisorError::Command {
            action: "logs".to_string(),
            message: "stdout not captured".to_string(),
        })?;
        debug!("Subscribed to pm2 log bus for process {}", id);

        let lines = BufReader::new(stdout).lines();
        let stream = futures_util::stream::unfold((child, lines), |(child, mut lines)| async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(event) = parse_log_event(&line) {
                            return Some((event, (child, lines)));
                        }
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        warn!("pm2 log feed read failed: {}", e);
                        return None;
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn start(&self, id: u32) -> Result<(), SupervisorError> {
        self.control("start", id).await
    }

    async fn stop(&self, id: u32) -> Result<(), SupervisorError> {
        self.control("stop", id).await
    }

    async fn restart(&self, id: u32) -> Result<(), SupervisorError> {
        self.control("restart", id).await
    }

    async fn delete(&self, id: u32) -> Result<(), SupervisorError> {
        self.control("delete", id).await
    }
}
