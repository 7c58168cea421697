//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job timed out after {0}s")]
    Timeout(u64),

    #[error("Storage error: {0}")]
    Storage(#[from] reelcut_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] reelcut_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] reelcut_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Media(e) => e.is_retryable(),
            WorkerError::Queue(e) => e.is_retryable(),
            WorkerError::Storage(_)
            | WorkerError::Io(_)
            | WorkerError::Timeout(_) => true,
            WorkerError::JobFailed(_) | WorkerError::ConfigError(_) => false,
        }
    }
}
