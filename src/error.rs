use thiserror::Error;

/// Supervisor 适配层错误
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Process {0} not found")]
    NotFound(u32),

    #[error("{action} failed: {message}")]
    Command { action: String, message: String },

    #[error("{0} is not supported by this supervisor")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse supervisor output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("config store unavailable")]
    Unavailable,

    #[error("{0} not found")]
    NotFound(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;
