use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChurnError {
    #[error("no state directory: set CHURN_STATE_DIR or pass --state-dir")]
    StateDirNotFound,

    #[error("storage entry '{key}' is corrupt: {reason}")]
    CorruptEntry { key: String, reason: String },

    #[error("storage is read-only: {0}")]
    ReadOnly(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChurnError>;
