use std::path::PathBuf;

pub type ReporterResult<T> = Result<T, ReporterError>;

#[derive(Debug, thiserror::Error)]
pub enum ReporterError {
    #[error("Failed to prepare report directory {path:?}: {source}")]
    ReportDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to copy attachment '{name}' from {from:?} to {to:?}: {source}")]
    AttachmentCopy {
        name: String,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
