//! 配置库的 SQLite 表结构
//!
//! 时间戳以毫秒保存。`group_id` 不设外键，分组可能只存在于 fallback 文档中。

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS task_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    color TEXT NOT NULL DEFAULT '#3B82F6',
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS process_configs (
    process_id INTEGER PRIMARY KEY,
    group_id INTEGER,
    auto_restart INTEGER NOT NULL DEFAULT 1,
    max_restarts INTEGER NOT NULL DEFAULT 15,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_process_configs_group ON process_configs(group_id);

CREATE TABLE IF NOT EXISTS metric_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    process_id INTEGER NOT NULL,
    cpu REAL NOT NULL,
    memory INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_metric_samples_process_ts ON metric_samples(process_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_metric_samples_ts ON metric_samples(timestamp);

CREATE TABLE IF NOT EXISTS log_lines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    process_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_log_lines_process_ts ON log_lines(process_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_log_lines_ts ON log_lines(timestamp);
"#;

/// 每个连接在建表前执行
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;
";
