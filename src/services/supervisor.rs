use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

use crate::error::SupervisorError;
use crate::models::ProcessSnapshot;

/// supervisor 推送的一条实时日志
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub process_id: u32,
    pub content: String,
    /// 来自 stderr
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

/// 实时日志流，drop 即取消订阅
pub type LogEventStream = BoxStream<'static, LogEvent>;

/// 外部进程管理器的访问接口
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// 当前所有进程的快照
    async fn list_snapshots(&self) -> Result<Vec<ProcessSnapshot>, SupervisorError>;

    /// 单个进程的快照，不存在时返回 `SupervisorError::NotFound`
    async fn describe(&self, id: u32) -> Result<ProcessSnapshot, SupervisorError>;

    /// 订阅某个进程的实时日志
    async fn subscribe_logs(&self, id: u32) -> Result<LogEventStream, SupervisorError>;

    async fn start(&self, id: u32) -> Result<(), SupervisorError>;

    async fn stop(&self, id: u32) -> Result<(), SupervisorError>;

    async fn restart(&self, id: u32) -> Result<(), SupervisorError>;

    async fn delete(&self, id: u32) -> Result<(), SupervisorError>;
}

#[cfg(test)]
pub mod testing {
    //! 测试用的可编排 supervisor

    use super::*;
    use crate::models::ProcessStatus;
    use futures_util::StreamExt;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    pub fn snapshot(id: u32, status: ProcessStatus) -> ProcessSnapshot {
        ProcessSnapshot {
            id,
            name: format!("app-{}", id),
            pid: (status == ProcessStatus::Online).then_some(1000 + id),
            status,
            cpu: 2.5,
            memory: 64 * 1024 * 1024,
            uptime: None,
            restarts: 0,
            script_path: Some(format!("/srv/app-{}/index.js", id)),
            cwd: Some(format!("/srv/app-{}", id)),
            out_log_path: None,
            err_log_path: None,
        }
    }

    #[derive(Default)]
    pub struct ScriptedSupervisor {
        pub snapshots: Mutex<Vec<ProcessSnapshot>>,
        pub fail_list: AtomicBool,
        pub list_calls: AtomicUsize,
        /// 这些 id 的控制操作会失败
        pub failing_ids: Mutex<HashSet<u32>>,
        pub actions: Mutex<Vec<(String, u32)>>,
        live_senders: Mutex<Vec<mpsc::UnboundedSender<LogEvent>>>,
        pub subscriptions: AtomicUsize,
    }

    impl ScriptedSupervisor {
        pub fn with_snapshots(snapshots: Vec<ProcessSnapshot>) -> Self {
            Self {
                snapshots: Mutex::new(snapshots),
                ..Default::default()
            }
        }

        pub fn set_logs(&self, id: u32, out: Option<PathBuf>, err: Option<PathBuf>) {
            let mut snapshots = self.snapshots.lock().unwrap();
            if let Some(s) = snapshots.iter_mut().find(|s| s.id == id) {
                s.out_log_path = out;
                s.err_log_path = err;
            }
        }

        /// 向所有仍然存活的订阅推送一条事件，返回收到的订阅数
        pub fn emit(&self, event: LogEvent) -> usize {
            let mut senders = self.live_senders.lock().unwrap();
            senders.retain(|tx| tx.send(event.clone()).is_ok());
            senders.len()
        }

        /// 仍然持有订阅的消费者数量
        pub fn live_subscribers(&self) -> usize {
            let mut senders = self.live_senders.lock().unwrap();
            senders.retain(|tx| !tx.is_closed());
            senders.len()
        }

        fn act(&self, action: &str, id: u32) -> Result<(), SupervisorError> {
            self.actions.lock().unwrap().push((action.to_string(), id));
            if self.failing_ids.lock().unwrap().contains(&id) {
                return Err(SupervisorError::Command {
                    action: action.to_string(),
                    message: "exit status 1".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Supervisor for ScriptedSupervisor {
        async fn list_snapshots(&self) -> Result<Vec<ProcessSnapshot>, SupervisorError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(SupervisorError::Command {
                    action: "jlist".to_string(),
                    message: "daemon not reachable".to_string(),
                });
            }
            Ok(self.snapshots.lock().unwrap().clone())
        }

        async fn describe(&self, id: u32) -> Result<ProcessSnapshot, SupervisorError> {
            self.snapshots
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.id == id)
                .cloned()
                .ok_or(SupervisorError::NotFound(id))
        }

        async fn subscribe_logs(&self, _id: u32) -> Result<LogEventStream, SupervisorError> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.live_senders.lock().unwrap().push(tx);
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
            let stream = futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            });
            Ok(stream.boxed())
        }

        async fn start(&self, id: u32) -> Result<(), SupervisorError> {
            self.act("start", id)
        }

        async fn stop(&self, id: u32) -> Result<(), SupervisorError> {
            self.act("stop", id)
        }

        async fn restart(&self, id: u32) -> Result<(), SupervisorError> {
            self.act("restart", id)
        }

        async fn delete(&self, id: u32) -> Result<(), SupervisorError> {
            self.act("delete", id)
        }
    }
}
