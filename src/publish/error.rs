use std::path::PathBuf;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid connection string: {reason}")]
    InvalidConnectionString { reason: String },

    #[error("store request failed with {status} ({code}): {message}")]
    Http {
        status: u16,
        code: String,
        message: String,
    },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Http { status: 401 | 403, .. })
    }
}
