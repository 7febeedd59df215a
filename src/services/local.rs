use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{debug, info};
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::{Interval, MissedTickBehavior};

use crate::error::SupervisorError;
use crate::models::{ProcessSnapshot, ProcessStatus};
use crate::services::process_checker::{find_main_pid, CmdlineMatcher};
use crate::services::supervisor::{LogEvent, LogEventStream, Supervisor};

const DEFAULT_FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

/// 本地模式下被监控的进程
#[derive(Debug, Clone, Deserialize)]
pub struct WatchedProcess {
    pub id: u32,
    pub name: String,
    /// 用于匹配进程的命令行模式
    pub cmdline: String,
    #[serde(default)]
    pub out_log: Option<PathBuf>,
    #[serde(default)]
    pub err_log: Option<PathBuf>,
}

struct Tracked {
    config: WatchedProcess,
    matcher: CmdlineMatcher,
    last_pid: Option<u32>,
    restarts: u32,
}

impl Tracked {
    fn new(config: WatchedProcess) -> Self {
        Self {
            matcher: CmdlineMatcher::new(&config.cmdline),
            config,
            last_pid: None,
            restarts: 0,
        }
    }

    /// 记录本次匹配到的 PID；PID 变化即视为一次重启
    fn observe(&mut self, pid: Option<u32>) {
        if let Some(current) = pid {
            if self.last_pid.is_some_and(|last| last != current) {
                self.restarts += 1;
            }
            self.last_pid = Some(current);
        }
    }
}

struct ProbeState {
    system: System,
    tracked: Vec<Tracked>,
}

impl ProbeState {
    fn probe(&mut self) -> Vec<ProcessSnapshot> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );

        let system = &self.system;
        self.tracked
            .iter_mut()
            .map(|tracked| {
                let pid = find_main_pid(system, &tracked.matcher);
                tracked.observe(pid);
                let process = pid.and_then(|p| system.process(Pid::from_u32(p)));

                ProcessSnapshot {
                    id: tracked.config.id,
                    name: tracked.config.name.clone(),
                    pid,
                    status: if process.is_some() {
                        ProcessStatus::Online
                    } else {
                        ProcessStatus::Stopped
                    },
                    cpu: process.map(|p| p.cpu_usage()).unwrap_or(0.0),
                    memory: process.map(|p| p.memory()).unwrap_or(0),
                    uptime: process.and_then(|p| DateTime::from_timestamp(p.start_time() as i64, 0)),
                    restarts: tracked.restarts,
                    script_path: process
                        .and_then(|p| p.exe())
                        .map(|p| p.display().to_string()),
                    cwd: process
                        .and_then(|p| p.cwd())
                        .map(|p| p.display().to_string()),
                    out_log_path: tracked.config.out_log.clone(),
                    err_log_path: tracked.config.err_log.clone(),
                }
            })
            .collect()
    }
}

/// 基于 sysinfo 的本地 supervisor
///
/// 只能观察进程，不能启动；stop 通过向主进程发送信号实现。
pub struct LocalSupervisor {
    state: Arc<Mutex<ProbeState>>,
    processes: Vec<WatchedProcess>,
    follow_interval: Duration,
}

impl LocalSupervisor {
    pub fn new(processes: Vec<WatchedProcess>) -> Self {
        let tracked = processes.iter().cloned().map(Tracked::new).collect();
        Self {
            state: Arc::new(Mutex::new(ProbeState {
                system: System::new(),
                tracked,
            })),
            processes,
            follow_interval: DEFAULT_FOLLOW_INTERVAL,
        }
    }

    #[cfg(test)]
    pub fn with_follow_interval(mut self, interval: Duration) -> Self {
        self.follow_interval = interval;
        self
    }

    /// 从 JSON 文件加载进程列表
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let processes: Vec<WatchedProcess> = serde_json::from_str(&body)
            .with_context(|| format!("invalid process list in {}", path.display()))?;

        let mut seen = HashSet::new();
        for p in &processes {
            if !seen.insert(p.id) {
                anyhow::bail!("duplicate process id {} in {}", p.id, path.display());
            }
        }
        info!("✓ Watching {} local processes from {}", processes.len(), path.display());
        Ok(Self::new(processes))
    }

    fn watched(&self, id: u32) -> Result<&WatchedProcess, SupervisorError> {
        self.processes
            .iter()
            .find(|p| p.id == id)
            .ok_or(SupervisorError::NotFound(id))
    }
}

#[async_trait]
impl Supervisor for LocalSupervisor {
    async fn list_snapshots(&self) -> Result<Vec<ProcessSnapshot>, SupervisorError> {
        let state = self.state.clone();
        let snapshots = tokio::task::spawn_blocking(move || {
            state.lock().unwrap_or_else(PoisonError::into_inner).probe()
        })
        .await?;
        Ok(snapshots)
    }

    async fn describe(&self, id: u32) -> Result<ProcessSnapshot, SupervisorError> {
        self.watched(id)?;
        self.list_snapshots()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or(SupervisorError::NotFound(id))
    }

    /// 轮询日志文件的增长，只推送订阅之后写入的内容
    async fn subscribe_logs(&self, id: u32) -> Result<LogEventStream, SupervisorError> {
        let watched = self.watched(id)?;
        let mut files = Vec::new();
        if let Some(path) = &watched.out_log {
            files.push(FollowedFile::start(path.clone(), false).await);
        }
        if let Some(path) = &watched.err_log {
            files.push(FollowedFile::start(path.clone(), true).await);
        }

        let mut ticker = tokio::time::interval(self.follow_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let follow = FollowState {
            process_id: id,
            files,
            pending: VecDeque::new(),
            ticker,
        };

        let stream = futures_util::stream::unfold(follow, |mut follow| async move {
            loop {
                if let Some(event) = follow.pending.pop_front() {
                    return Some((event, follow));
                }
                follow.ticker.tick().await;
                for file in follow.files.iter_mut() {
                    match file.poll().await {
                        Ok(lines) => {
                            for content in lines {
                                follow.pending.push_back(LogEvent {
                                    process_id: follow.process_id,
                                    content,
                                    is_error: file.is_error,
                                    timestamp: Utc::now(),
                                });
                            }
                        }
                        Err(e) => debug!("Failed to follow {}: {}", file.path.display(), e),
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn start(&self, _id: u32) -> Result<(), SupervisorError> {
        Err(SupervisorError::Unsupported("start"))
    }

    async fn stop(&self, id: u32) -> Result<(), SupervisorError> {
        let snapshot = self.describe(id).await?;
        let Some(pid) = snapshot.pid else {
            return Err(SupervisorError::Command {
                action: "stop".to_string(),
                message: "process is not running".to_string(),
            });
        };

        let state = self.state.clone();
        let killed = tokio::task::spawn_blocking(move || {
            let guard = state.lock().unwrap_or_else(PoisonError::into_inner);
            guard
                .system
                .process(Pid::from_u32(pid))
                .map(|p| p.kill())
                .unwrap_or(false)
        })
        .await?;

        if killed {
            info!("✓ Sent kill to PID {} ({})", pid, snapshot.name);
            Ok(())
        } else {
            Err(SupervisorError::Command {
                action: "stop".to_string(),
                message: format!("failed to signal PID {}", pid),
            })
        }
    }

    async fn restart(&self, _id: u32) -> Result<(), SupervisorError> {
        Err(SupervisorError::Unsupported("restart"))
    }

    async fn delete(&self, _id: u32) -> Result<(), SupervisorError> {
        Err(SupervisorError::Unsupported("delete"))
    }
}

struct FollowState {
    process_id: u32,
    files: Vec<FollowedFile>,
    pending: VecDeque<LogEvent>,
    ticker: Interval,
}

/// 追踪单个日志文件的读取位置
struct FollowedFile {
    path: PathBuf,
    is_error: bool,
    offset: u64,
    partial: Vec<u8>,
}

impl FollowedFile {
    async fn start(path: PathBuf, is_error: bool) -> Self {
        let offset = tokio::fs::metadata(&path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        Self {
            path,
            is_error,
            offset,
            partial: Vec::new(),
        }
    }

    /// 读取新增内容，返回其中完整的行；不完整的尾部留到下一次
    async fn poll(&mut self) -> std::io::Result<Vec<String>> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if len < self.offset {
            // 文件被截断或轮转
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        file.take(len - self.offset).read_to_end(&mut buf).await?;
        self.offset += buf.len() as u64;
        self.partial.extend_from_slice(&buf);

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            lines.push(text.trim_end_matches('\n').trim_end_matches('\r').to_string());
        }
        Ok(lines)
    }
}
