use chrono::Utc;
use log::{debug, info, warn};
use prometheus::Gauge;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::SupervisorError;
use crate::metrics::METRICS;
use crate::models::{ClientCommand, LogKind, MergedProcess, ProcessSnapshot, ServerEvent};
use crate::services::log_tailer::LogTailer;
use crate::services::merger::{merge, sample_online};
use crate::services::supervisor::Supervisor;
use crate::store::{ConfigStore, FallbackStore};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

pub type SessionId = u64;
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// 后台任务共享的依赖
#[derive(Clone)]
pub struct MonitorContext {
    pub supervisor: Arc<dyn Supervisor>,
    pub config_store: ConfigStore,
    pub fallback_store: FallbackStore,
    pub poll_interval: Duration,
    pub tail_lines: usize,
}

impl MonitorContext {
    /// 拉取快照并与两个存储合并
    pub async fn merged_view(
        &self,
    ) -> Result<(Vec<ProcessSnapshot>, Vec<MergedProcess>), SupervisorError> {
        let snapshots = self.supervisor.list_snapshots().await?;
        let configs = self.config_store.list_process_configs().await;
        let fallback = self.fallback_store.assignments().await;
        let merged = merge(&snapshots, &configs, &fallback);
        Ok((snapshots, merged))
    }

    /// 同一份依赖，但历史写入经过独立的写入开关
    fn gated(&self) -> Self {
        Self {
            config_store: self.config_store.with_write_gate(),
            ..self.clone()
        }
    }

    fn log_tailer(&self) -> LogTailer {
        LogTailer::new(
            self.supervisor.clone(),
            self.config_store.clone(),
            self.tail_lines,
        )
    }
}

/// 执行一个 fetch → merge → push → persist 周期
///
/// 返回 false 表示观察者已经断开，调用方应停止循环。
pub async fn run_cycle(ctx: &MonitorContext, events: &EventSender) -> bool {
    METRICS.monitor_cycles.inc();

    let (snapshots, merged) = match ctx.merged_view().await {
        Ok(view) => view,
        Err(e) => {
            warn!("Failed to fetch process snapshots: {}", e);
            METRICS.monitor_cycle_errors.inc();
            return events
                .send(ServerEvent::error(format!("Failed to fetch processes: {}", e)))
                .is_ok();
        }
    };

    debug!("Pushing {} processes", merged.len());
    if events.send(ServerEvent::ProcessesUpdate(merged)).is_err() {
        return false;
    }

    let persisted = ctx
        .config_store
        .insert_metric_samples(sample_online(&snapshots, Utc::now()))
        .await;
    METRICS.metric_samples_persisted.inc_by(persisted as f64);
    true
}

async fn monitor_loop(ctx: MonitorContext, events: EventSender) {
    let mut ticker = tokio::time::interval(ctx.poll_interval);
    // 周期串行执行，慢周期不会导致补发的 tick 叠加
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !run_cycle(&ctx, &events).await {
            debug!("Observer gone, monitoring loop exits");
            break;
        }
    }
}

/// 任务存活期间 gauge 加一，任务结束或被取消时随 drop 减一
struct ActiveGauge(Gauge);

impl ActiveGauge {
    fn enter(gauge: &Gauge) -> Self {
        gauge.inc();
        Self(gauge.clone())
    }
}

impl Drop for ActiveGauge {
    fn drop(&mut self) {
        self.0.dec();
    }
}

fn spawn_counted<F>(gauge: &Gauge, work: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let active = ActiveGauge::enter(gauge);
    tokio::spawn(async move {
        let _active = active;
        work.await;
    })
}

/// 一个后台任务及其写入句柄
struct Task {
    handle: JoinHandle<()>,
    store: ConfigStore,
}

impl Task {
    #[cfg(test)]
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// 取消任务并等待其结束；返回后该任务不会再写入任何历史数据
    async fn cancel(self) {
        self.handle.abort();
        let _ = self.handle.await;
        self.store.close_writes().await;
    }
}

/// 单个观察者连接的状态
struct Session {
    events: EventSender,
    monitor: Option<Task>,
    log_stream: Option<Task>,
}

/// 管理所有观察者会话
///
/// 每个会话最多一个轮询任务和一个日志流任务，启动新任务前先取消旧任务；
/// 断开连接时两个任务都会被取消。
pub struct SessionManager {
    ctx: MonitorContext,
    sessions: Mutex<HashMap<SessionId, Session>>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(ctx: MonitorContext) -> Self {
        Self {
            ctx,
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn context(&self) -> &MonitorContext {
        &self.ctx
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connect(&self, events: EventSender) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions().insert(
            id,
            Session {
                events,
                monitor: None,
                log_stream: None,
            },
        );
        METRICS.sessions_active.inc();
        info!("✓ Session {} connected", id);
        id
    }

    pub async fn handle_command(&self, id: SessionId, command: ClientCommand) {
        debug!("Session {} command: {:?}", id, command);
        match command {
            ClientCommand::StartMonitoring => self.start_monitoring(id).await,
            ClientCommand::StopMonitoring => self.stop_monitoring(id).await,
            ClientCommand::StartLogStream { process_id, kind } => {
                self.start_log_stream(id, process_id, kind).await
            }
            ClientCommand::StopLogStream => self.stop_log_stream(id).await,
        }
    }

    pub async fn start_monitoring(&self, id: SessionId) {
        let Some((previous, events)) = self.take_task(id, |s| &mut s.monitor) else {
            warn!("start-monitoring for unknown session {}", id);
            return;
        };
        if let Some(task) = previous {
            task.cancel().await;
        }

        let ctx = self.ctx.gated();
        let store = ctx.config_store.clone();
        let mut sessions = self.sessions();
        if let Some(session) = sessions.get_mut(&id) {
            let handle = spawn_counted(&METRICS.monitors_active, monitor_loop(ctx, events));
            session.monitor = Some(Task { handle, store });
            info!("Session {} monitoring every {:?}", id, self.ctx.poll_interval);
        }
    }

    /// 幂等：没有轮询任务时什么也不做
    pub async fn stop_monitoring(&self, id: SessionId) {
        if let Some((Some(task), _)) = self.take_task(id, |s| &mut s.monitor) {
            task.cancel().await;
            info!("Session {} monitoring stopped", id);
        }
    }

    pub async fn start_log_stream(&self, id: SessionId, process_id: u32, kind: LogKind) {
        let Some((previous, events)) = self.take_task(id, |s| &mut s.log_stream) else {
            warn!("start-log-stream for unknown session {}", id);
            return;
        };
        if let Some(task) = previous {
            task.cancel().await;
        }

        let ctx = self.ctx.gated();
        let store = ctx.config_store.clone();
        let tailer = ctx.log_tailer();
        let mut sessions = self.sessions();
        if let Some(session) = sessions.get_mut(&id) {
            let handle = spawn_counted(&METRICS.log_streams_active, async move {
                if let Err(e) = tailer.run(process_id, kind, &events).await {
                    warn!("Log stream for process {} failed: {}", process_id, e);
                    let _ = events.send(ServerEvent::error(e.to_string()));
                }
            });
            session.log_stream = Some(Task { handle, store });
        }
    }

    /// 幂等：没有日志流时什么也不做
    pub async fn stop_log_stream(&self, id: SessionId) {
        if let Some((Some(task), _)) = self.take_task(id, |s| &mut s.log_stream) {
            task.cancel().await;
            info!("Session {} log stream stopped", id);
        }
    }

    /// 移除会话并释放它的所有后台任务
    ///
    /// 返回后该会话不会再推送事件，也不会再写入指标或日志。
    pub async fn disconnect(&self, id: SessionId) {
        let Some(session) = self.sessions().remove(&id) else {
            return;
        };
        if let Some(task) = session.monitor {
            task.cancel().await;
        }
        if let Some(task) = session.log_stream {
            task.cancel().await;
        }
        METRICS.sessions_active.dec();
        info!("✓ Session {} disconnected, background work released", id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    #[cfg(test)]
    pub fn is_monitoring(&self, id: SessionId) -> bool {
        self.sessions()
            .get(&id)
            .and_then(|s| s.monitor.as_ref())
            .is_some_and(Task::is_running)
    }

    /// 日志流任务自行结束（例如进程不存在）后返回 false
    #[cfg(test)]
    pub fn is_streaming(&self, id: SessionId) -> bool {
        self.sessions()
            .get(&id)
            .and_then(|s| s.log_stream.as_ref())
            .is_some_and(Task::is_running)
    }

    /// 取出某类任务，会话不存在时返回 None
    fn take_task(
        &self,
        id: SessionId,
        slot: impl FnOnce(&mut Session) -> &mut Option<Task>,
    ) -> Option<(Option<Task>, EventSender)> {
        let mut sessions = self.sessions();
        let session = sessions.get_mut(&id)?;
        let events = session.events.clone();
        Some((slot(session).take(), events))
    }
}
