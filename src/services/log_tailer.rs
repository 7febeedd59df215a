use chrono::Utc;
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::error::SupervisorError;
use crate::metrics::METRICS;
use crate::models::{LogKind, LogLine, ProcessSnapshot, ServerEvent, StreamKind};
use crate::services::supervisor::Supervisor;
use crate::store::ConfigStore;

pub const DEFAULT_TAIL_LINES: usize = 100;

/// 读取文件最后 `limit` 行
///
/// 逐行读取，只保留一个固定大小的滑动窗口，不会把整个文件读进内存。
/// 非 UTF-8 内容按 lossy 方式转换。
pub async fn read_tail(path: &Path, limit: usize) -> std::io::Result<Vec<String>> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut window: VecDeque<String> = VecDeque::with_capacity(limit.min(4096));
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        if limit == 0 {
            continue;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        if window.len() == limit {
            window.pop_front();
        }
        window.push_back(line.to_string());
    }

    Ok(window.into())
}

/// 根据请求的类型选择日志文件，stdout 总在 stderr 之前
pub fn select_files(snapshot: &ProcessSnapshot, kind: LogKind) -> Vec<(StreamKind, PathBuf)> {
    let candidates = [
        (StreamKind::Stdout, &snapshot.out_log_path),
        (StreamKind::Stderr, &snapshot.err_log_path),
    ];
    candidates
        .into_iter()
        .filter(|(stream, _)| kind.includes(*stream))
        .filter_map(|(stream, path)| path.clone().map(|p| (stream, p)))
        .collect()
}

/// 单个日志流请求：先回放历史尾部，再接入实时事件
///
/// 历史回放按文件顺序处理（先 stdout 后 stderr），两个文件之间不按时间交错。
/// 每一行先推送给观察者，再写入配置库。
#[derive(Clone)]
pub struct LogTailer {
    supervisor: Arc<dyn Supervisor>,
    store: ConfigStore,
    tail_lines: usize,
}

impl LogTailer {
    pub fn new(supervisor: Arc<dyn Supervisor>, store: ConfigStore, tail_lines: usize) -> Self {
        Self {
            supervisor,
            store,
            tail_lines,
        }
    }

    /// 运行到实时流结束或观察者断开为止
    pub async fn run(
        &self,
        process_id: u32,
        kind: LogKind,
        events: &mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<(), SupervisorError> {
        let snapshot = self.supervisor.describe(process_id).await?;
        info!("🔄 Streaming {:?} logs for process {} ({})", kind, process_id, snapshot.name);

        for (stream, path) in select_files(&snapshot, kind) {
            let lines = match read_tail(&path, self.tail_lines).await {
                Ok(lines) => lines,
                Err(e) => {
                    warn!("Skipping log history {}: {}", path.display(), e);
                    let _ = events.send(ServerEvent::error(format!(
                        "Failed to read {} log for process {}: {}",
                        stream.as_str(),
                        process_id,
                        e
                    )));
                    continue;
                }
            };
            debug!("Replaying {} lines from {}", lines.len(), path.display());

            for content in lines {
                let line = LogLine {
                    process_id,
                    kind: stream,
                    content,
                    timestamp: Utc::now(),
                };
                if !self.deliver(line, events, "history").await {
                    return Ok(());
                }
            }
        }

        let mut feed = self.supervisor.subscribe_logs(process_id).await?;
        while let Some(event) = feed.next().await {
            if event.process_id != process_id || event.content.is_empty() {
                continue;
            }
            let stream = if event.is_error {
                StreamKind::Stderr
            } else {
                StreamKind::Stdout
            };
            if !kind.includes(stream) {
                continue;
            }
            let line = LogLine {
                process_id,
                kind: stream,
                content: event.content,
                timestamp: event.timestamp,
            };
            if !self.deliver(line, events, "live").await {
                break;
            }
        }

        debug!("Log stream for process {} finished", process_id);
        Ok(())
    }

    /// 推送并持久化一行；观察者已断开时返回 false
    async fn deliver(
        &self,
        line: LogLine,
        events: &mpsc::UnboundedSender<ServerEvent>,
        source: &str,
    ) -> bool {
        if events.send(ServerEvent::LogLine(line.clone())).is_err() {
            return false;
        }
        METRICS.log_lines_delivered.with_label_values(&[source]).inc();
        self.store.insert_log_line(line).await;
        true
    }
}
