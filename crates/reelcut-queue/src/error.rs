//! Queue error types.

use thiserror::Error;

use reelcut_models::InvalidTransition;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Duplicate job: {0}")]
    DuplicateJob(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Corrupt job record {job_id}: {message}")]
    CorruptRecord { job_id: String, message: String },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    /// Transport failures are worth another attempt; everything else will
    /// fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::Redis(_) | QueueError::ConnectionFailed(_))
    }

    pub fn corrupt(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            job_id: job_id.into(),
            message: message.into(),
        }
    }
}
