use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoseError {
    #[error("pose model file '{}' does not exist", path.display())]
    ModelNotFound { path: PathBuf },
    #[error("failed to parse pose model '{}': {source}", path.display())]
    ModelFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("pose runtime has been shut down")]
    RuntimeClosed,
    #[error("backend error: {message}")]
    Backend { message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoseError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
