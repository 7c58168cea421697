//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// How the executor classified a failed tool run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Client-side problem (bad input, missing codec); retrying cannot help
    Fatal,
    /// Anything else, including timeouts
    Retryable,
}

/// Diagnostics captured from a failed external tool run.
#[derive(Debug, Clone)]
pub struct ToolFailure {
    pub kind: FailureKind,
    /// Short message safe to show to end users
    pub user_message: String,
    /// Full command line that was run
    pub command: String,
    /// Tail of the tool's stderr
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// Attempts made before giving up
    pub attempts: u32,
}

impl ToolFailure {
    /// Internal diagnostics (command and stderr), never shown to end users.
    pub fn diagnostics(&self) -> String {
        format!(
            "command: {}\nexit code: {}\nattempts: {}\nstderr: {}",
            self.command,
            self.exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.attempts,
            self.stderr
        )
    }
}

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("{}", .0.user_message)]
    ToolFailed(Box<ToolFailure>),

    #[error("Retries exhausted after {} attempts: {}", .0.attempts, .0.user_message)]
    RetriesExhausted(Box<ToolFailure>),

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Encoder produced an empty artifact: {0}")]
    EmptyArtifact(PathBuf),

    #[error("Nothing to render: selection is empty")]
    EmptySelection,

    #[error("Event detector failed: {0}")]
    EventDetector(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an event detector error.
    pub fn event_detector(message: impl Into<String>) -> Self {
        Self::EventDetector(message.into())
    }

    /// Whether the failure was classified as transient.
    ///
    /// Exhausted retries are reported as not retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            MediaError::ToolFailed(f) => f.kind == FailureKind::Retryable,
            MediaError::Timeout(_) | MediaError::Io(_) | MediaError::EventDetector(_) => true,
            _ => false,
        }
    }

    /// Short sanitized message for the job's user-visible error field.
    pub fn user_message(&self) -> String {
        match self {
            MediaError::ToolFailed(f) | MediaError::RetriesExhausted(f) => f.user_message.clone(),
            MediaError::FileNotFound(_) => "An input file could not be found.".to_string(),
            MediaError::InvalidVideo(_) => {
                "The uploaded file is not a readable video.".to_string()
            }
            MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => {
                "Video tools are not available on this worker.".to_string()
            }
            MediaError::Timeout(_) => "Video processing took too long.".to_string(),
            _ => "Video processing failed.".to_string(),
        }
    }

    /// Full diagnostics for the internal error log.
    pub fn diagnostics(&self) -> String {
        match self {
            MediaError::ToolFailed(f) | MediaError::RetriesExhausted(f) => {
                format!("{}\n{}", self, f.diagnostics())
            }
            MediaError::FfprobeFailed {
                message,
                stderr: Some(stderr),
            } => format!("{}\nstderr: {}", message, stderr),
            other => other.to_string(),
        }
    }
}
