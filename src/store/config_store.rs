use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{StoreError, StoreResult};
use crate::models::{
    LogLine, LogQuery, MetricQuery, MetricSample, NewTaskGroup, ProcessConfig, RestartPolicy,
    StreamKind, TaskGroup, TaskGroupPatch,
};
use crate::models::history::{DEFAULT_LOG_LIMIT, DEFAULT_METRIC_LIMIT};
use crate::store::schema::{PRAGMAS, SCHEMA};

/// 历史数据写入开关
///
/// 关闭后，经由持有它的 store 发起的指标和日志写入不再落库，
/// 包括已经排队在阻塞线程池里的写入。
#[derive(Clone, Debug, Default)]
pub struct WriteGate(Arc<AtomicBool>);

impl WriteGate {
    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 持久化配置库（SQLite）
///
/// 打开失败时进入不可用状态：读操作返回空结果，插入和清理为空操作，
/// 分组相关的修改返回 `StoreError::Unavailable`，由上层改写到 fallback 存储。
#[derive(Clone)]
pub struct ConfigStore {
    conn: Option<Arc<Mutex<Connection>>>,
    gate: Option<WriteGate>,
}

impl ConfigStore {
    /// 打开数据库，失败时返回不可用的 store 而不是报错
    pub fn open(path: &Path) -> Self {
        match Self::try_open(path) {
            Ok(store) => {
                info!("✓ Config store opened at {}", path.display());
                store
            }
            Err(e) => {
                warn!("⚠️  Config store unavailable ({}): {}", path.display(), e);
                warn!("   Group changes will be written to the fallback store");
                Self::unavailable()
            }
        }
    }

    pub fn try_open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(PRAGMAS)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Some(Arc::new(Mutex::new(conn))),
            gate: None,
        })
    }

    pub fn unavailable() -> Self {
        Self {
            conn: None,
            gate: None,
        }
    }

    /// 共享同一连接、带独立写入开关的句柄，供单个后台任务使用
    pub fn with_write_gate(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            gate: Some(WriteGate::default()),
        }
    }

    /// 关闭写入开关并等待已持有连接的写入完成
    ///
    /// 返回后，这个句柄发起的任何历史写入都不会再提交。
    pub async fn close_writes(&self) {
        let Some(gate) = &self.gate else {
            return;
        };
        gate.close();
        if self.is_available() {
            if let Err(e) = self.call(|_| Ok(())).await {
                debug!("Write barrier failed: {}", e);
            }
        }
    }

    fn gate_closed(gate: &Option<WriteGate>) -> bool {
        gate.as_ref().is_some_and(WriteGate::is_closed)
    }

    pub fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    /// 在阻塞线程池中执行一次数据库操作
    async fn call<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone().ok_or(StoreError::Unavailable)?;
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Unavailable)?;
            f(&mut guard)
        })
        .await?
    }

    // ---------------------------------------------------------------
    // 分组
    // ---------------------------------------------------------------

    pub async fn list_groups(&self) -> Vec<TaskGroup> {
        let result = self
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, description, color FROM task_groups ORDER BY id",
                )?;
                let groups = stmt
                    .query_map([], row_to_group)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(groups)
            })
            .await;
        or_empty("list groups", result)
    }

    pub async fn create_group(&self, new: NewTaskGroup) -> StoreResult<TaskGroup> {
        self.call(move |conn| {
            let color = new.color_or_default();
            conn.execute(
                "INSERT INTO task_groups (name, description, color, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![new.name, new.description, color, now_millis()],
            )?;
            Ok(TaskGroup {
                id: conn.last_insert_rowid(),
                name: new.name,
                description: new.description,
                color,
            })
        })
        .await
    }

    pub async fn update_group(&self, id: i64, patch: TaskGroupPatch) -> StoreResult<TaskGroup> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let mut group = tx
                .query_row(
                    "SELECT id, name, description, color FROM task_groups WHERE id = ?1",
                    params![id],
                    row_to_group,
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("Group {}", id)))?;

            patch.apply(&mut group);
            tx.execute(
                "UPDATE task_groups SET name = ?1, description = ?2, color = ?3 WHERE id = ?4",
                params![group.name, group.description, group.color, id],
            )?;
            tx.commit()?;
            Ok(group)
        })
        .await
    }

    /// 删除分组，并把引用它的进程归属置空。返回分组是否存在。
    pub async fn delete_group(&self, id: i64) -> StoreResult<bool> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let detached = tx.execute(
                "UPDATE process_configs SET group_id = NULL, updated_at = ?2 WHERE group_id = ?1",
                params![id, now_millis()],
            )?;
            let removed = tx.execute("DELETE FROM task_groups WHERE id = ?1", params![id])?;
            tx.commit()?;
            debug!("Deleted group {} ({} processes detached)", id, detached);
            Ok(removed > 0)
        })
        .await
    }

    // ---------------------------------------------------------------
    // 进程配置
    // ---------------------------------------------------------------

    pub async fn list_process_configs(&self) -> Vec<ProcessConfig> {
        let result = self
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT process_id, group_id, auto_restart, max_restarts
                     FROM process_configs ORDER BY process_id",
                )?;
                let configs = stmt
                    .query_map([], |row| {
                        Ok(ProcessConfig {
                            process_id: row.get(0)?,
                            group_id: row.get(1)?,
                            restart_policy: RestartPolicy {
                                auto_restart: row.get(2)?,
                                max_restarts: row.get(3)?,
                            },
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(configs)
            })
            .await;
        or_empty("list process configs", result)
    }

    pub async fn assign_group(&self, process_id: u32, group_id: Option<i64>) -> StoreResult<()> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO process_configs (process_id, group_id, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(process_id) DO UPDATE SET
                     group_id = excluded.group_id,
                     updated_at = excluded.updated_at",
                params![process_id, group_id, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_restart_policy(&self, process_id: u32, policy: RestartPolicy) -> StoreResult<()> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO process_configs (process_id, auto_restart, max_restarts, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(process_id) DO UPDATE SET
                     auto_restart = excluded.auto_restart,
                     max_restarts = excluded.max_restarts,
                     updated_at = excluded.updated_at",
                params![process_id, policy.auto_restart, policy.max_restarts, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    // ---------------------------------------------------------------
    // 历史数据
    // ---------------------------------------------------------------

    /// 批量写入指标采样，返回写入条数
    pub async fn insert_metric_samples(&self, samples: Vec<MetricSample>) -> usize {
        if samples.is_empty() || !self.is_available() {
            return 0;
        }
        let gate = self.gate.clone();
        let result = self
            .call(move |conn| {
                if Self::gate_closed(&gate) {
                    return Ok(0);
                }
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO metric_samples (process_id, cpu, memory, timestamp)
                         VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for sample in &samples {
                        stmt.execute(params![
                            sample.process_id,
                            sample.cpu as f64,
                            sample.memory as i64,
                            sample.timestamp.timestamp_millis()
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(samples.len())
            })
            .await;
        match result {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to persist metric samples: {}", e);
                0
            }
        }
    }

    pub async fn insert_log_line(&self, line: LogLine) -> bool {
        if !self.is_available() {
            return false;
        }
        let gate = self.gate.clone();
        let result = self
            .call(move |conn| {
                if Self::gate_closed(&gate) {
                    return Ok(false);
                }
                conn.execute(
                    "INSERT INTO log_lines (process_id, kind, content, timestamp)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        line.process_id,
                        line.kind.as_str(),
                        line.content,
                        line.timestamp.timestamp_millis()
                    ],
                )?;
                Ok(true)
            })
            .await;
        match result {
            Ok(inserted) => inserted,
            Err(e) => {
                warn!("Failed to persist log line: {}", e);
                false
            }
        }
    }

    /// 按时间范围查询指标，取最新的 `limit` 条并按时间正序返回
    pub async fn query_metrics(&self, process_id: u32, query: MetricQuery) -> Vec<MetricSample> {
        let limit = query.limit.unwrap_or(DEFAULT_METRIC_LIMIT) as i64;
        let start = query.start.map(|t| t.timestamp_millis());
        let end = query.end.map(|t| t.timestamp_millis());

        let result = self
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT process_id, cpu, memory, timestamp FROM metric_samples
                     WHERE process_id = ?1
                       AND (?2 IS NULL OR timestamp >= ?2)
                       AND (?3 IS NULL OR timestamp <= ?3)
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?4",
                )?;
                let mut samples = stmt
                    .query_map(params![process_id, start, end, limit], |row| {
                        Ok(MetricSample {
                            process_id: row.get(0)?,
                            cpu: row.get::<_, f64>(1)? as f32,
                            memory: row.get::<_, i64>(2)?.max(0) as u64,
                            timestamp: from_millis(row.get(3)?),
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                samples.reverse();
                Ok(samples)
            })
            .await;
        or_empty("query metrics", result)
    }

    pub async fn query_logs(&self, process_id: u32, query: LogQuery) -> Vec<LogLine> {
        let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT) as i64;
        let start = query.start.map(|t| t.timestamp_millis());
        let end = query.end.map(|t| t.timestamp_millis());
        let keyword = query.keyword.filter(|k| !k.is_empty());

        let result = self
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT process_id, kind, content, timestamp FROM log_lines
                     WHERE process_id = ?1
                       AND (?2 IS NULL OR timestamp >= ?2)
                       AND (?3 IS NULL OR timestamp <= ?3)
                       AND (?4 IS NULL OR instr(content, ?4) > 0)
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?5",
                )?;
                let mut lines = stmt
                    .query_map(params![process_id, start, end, keyword, limit], |row| {
                        let kind: String = row.get(1)?;
                        Ok(LogLine {
                            process_id: row.get(0)?,
                            kind: StreamKind::parse(&kind).unwrap_or(StreamKind::Stdout),
                            content: row.get(2)?,
                            timestamp: from_millis(row.get(3)?),
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                lines.reverse();
                Ok(lines)
            })
            .await;
        or_empty("query logs", result)
    }

    // ---------------------------------------------------------------
    // 过期清理
    // ---------------------------------------------------------------

    pub async fn purge_metrics_older_than(&self, days: u32) -> usize {
        self.purge("metric_samples", Utc::now() - Duration::days(days as i64))
            .await
    }

    pub async fn purge_logs_older_than(&self, days: u32) -> usize {
        self.purge("log_lines", Utc::now() - Duration::days(days as i64))
            .await
    }

    async fn purge(&self, table: &'static str, cutoff: DateTime<Utc>) -> usize {
        if !self.is_available() {
            return 0;
        }
        let cutoff = cutoff.timestamp_millis();
        let result = self
            .call(move |conn| {
                let sql = format!("DELETE FROM {} WHERE timestamp < ?1", table);
                Ok(conn.execute(&sql, params![cutoff])?)
            })
            .await;
        match result {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("Failed to purge {}: {}", table, e);
                0
            }
        }
    }
}

fn row_to_group(row: &Row<'_>) -> rusqlite::Result<TaskGroup> {
    Ok(TaskGroup {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        color: row.get(3)?,
    })
}

/// 读路径在 store 不可用或出错时返回空结果
fn or_empty<T: Default>(action: &str, result: StoreResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(StoreError::Unavailable) => T::default(),
        Err(e) => {
            warn!("Config store {} failed: {}", action, e);
            T::default()
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
