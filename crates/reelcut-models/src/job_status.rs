//! Persisted job state: status machine, progress snapshot and error detail.
//!
//! A [`JobRecord`] is the document the worker writes to the job store. The
//! store only ever receives [`JobUpdate`] patches; [`JobRecord::apply`]
//! enforces the status transition rules and keeps `error_detail` append-only.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::JobId;

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job is queued waiting for a worker
    #[default]
    Pending,
    /// Job is actively being processed
    Processing,
    /// Job was abandoned by a worker and is being picked up again
    Retrying,
    /// Job completed successfully
    Success,
    /// Job failed with an error
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Retrying => "RETRYING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }

    /// Whether `self -> next` is an allowed transition.
    ///
    /// Re-asserting the current non-terminal status is allowed so progress
    /// writes can carry the status unchanged.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Success | Failed, _) => false,
            (a, b) if *a == b => true,
            (Pending, Processing | Retrying | Failed) => true,
            (Processing, Retrying | Success | Failed) => true,
            (Retrying, Processing | Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "RETRYING" => Ok(JobStatus::Retrying),
            "SUCCESS" => Ok(JobStatus::Success),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid job status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Severity of a recorded stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Failure that ended the job
    Critical,
    /// Failure the job recovered from with a degraded result
    Warning,
}

/// One entry in the append-only `error_detail` log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorDetail {
    pub category: ErrorCategory,
    pub stage: String,
    /// Full diagnostic text (may include command line and stderr)
    pub error: String,
    /// Whether the underlying tool failure was classified as transient
    #[serde(default)]
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

impl ErrorDetail {
    pub fn critical(stage: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Critical,
            stage: stage.into(),
            error: error.into(),
            retryable: false,
            timestamp: Utc::now(),
        }
    }

    pub fn warning(stage: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Warning,
            stage: stage.into(),
            error: error.into(),
            retryable: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

/// Progress snapshot, stored as a JSON string on the job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobProgress {
    /// Overall completion (0-100)
    pub percentage: u8,
    pub stage: String,
    pub message: String,
    /// When the current stage began
    pub stage_started: DateTime<Utc>,
}

impl JobProgress {
    pub fn new(percentage: u8, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            percentage: percentage.min(100),
            stage: stage.into(),
            message: message.into(),
            stage_started: Utc::now(),
        }
    }

    /// Serialize to the stored JSON form.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::new(0, "pending", "Queued")
    }
}

/// Persisted job document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub stage: String,
    pub progress: JobProgress,
    pub target_duration: f64,
    /// Short user-facing error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub error_detail: Vec<ErrorDetail>,
    /// Preset name -> public reference of the final artifact
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a new PENDING record.
    pub fn new(job_id: JobId, target_duration: f64) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            stage: "pending".to_string(),
            progress: JobProgress::default(),
            target_duration,
            error: None,
            error_detail: Vec::new(),
            outputs: BTreeMap::new(),
            started_at: None,
            finished_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a patch. Fails without modifying the record on a bad transition.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), InvalidTransition> {
        if let Some(next) = update.status {
            if !self.status.can_transition_to(next) {
                return Err(InvalidTransition {
                    from: self.status,
                    to: next,
                });
            }
            self.status = next;
        }
        if let Some(stage) = update.stage {
            self.stage = stage;
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        self.error_detail.extend(update.append_error_detail);
        if let Some(outputs) = update.outputs {
            self.outputs = outputs;
        }
        if let Some(started_at) = update.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(finished_at) = update.finished_at {
            self.finished_at = Some(finished_at);
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Partial update to a job record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub stage: Option<String>,
    pub progress: Option<JobProgress>,
    pub error: Option<String>,
    /// Entries appended to `error_detail`
    pub append_error_detail: Vec<ErrorDetail>,
    pub outputs: Option<BTreeMap<String, String>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: JobProgress) -> Self {
        self.stage = Some(progress.stage.clone());
        self.progress = Some(progress);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn append_error(mut self, detail: ErrorDetail) -> Self {
        self.append_error_detail.push(detail);
        self
    }

    pub fn outputs(mut self, outputs: BTreeMap<String, String>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn started_now(mut self) -> Self {
        self.started_at = Some(Utc::now());
        self
    }

    pub fn finished_now(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Success));
        assert!(Processing.can_transition_to(Retrying));
        assert!(Retrying.can_transition_to(Processing));
        assert!(!Retrying.can_transition_to(Success));
        assert!(!Pending.can_transition_to(Success));
        assert!(!Success.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn test_apply_rejects_transition_out_of_terminal() {
        let mut record = JobRecord::new(JobId::from_string("job-1"), 20.0);
        record
            .apply(JobUpdate::new().status(JobStatus::Processing).started_now())
            .unwrap();
        record
            .apply(JobUpdate::new().status(JobStatus::Failed).error("boom"))
            .unwrap();

        let err = record
            .apply(JobUpdate::new().status(JobStatus::Processing))
            .unwrap_err();
        assert_eq!(err.from, JobStatus::Failed);
        assert_eq!(record.status, JobStatus::Failed);
    }

    #[test]
    fn test_error_detail_is_appended() {
        let mut record = JobRecord::new(JobId::from_string("job-1"), 20.0);
        record
            .apply(JobUpdate::new().append_error(ErrorDetail::warning("music", "no bed")))
            .unwrap();
        record
            .apply(JobUpdate::new().append_error(ErrorDetail::critical("render", "all failed")))
            .unwrap();

        assert_eq!(record.error_detail.len(), 2);
        assert_eq!(record.error_detail[0].category, ErrorCategory::Warning);
        assert_eq!(record.error_detail[1].stage, "render");
    }

    #[test]
    fn test_progress_json_shape() {
        let progress = JobProgress::new(42, "render", "Rendering portrait");
        let value: serde_json::Value = serde_json::from_str(&progress.to_json()).unwrap();
        assert_eq!(value["percentage"], 42);
        assert_eq!(value["stage"], "render");
        assert!(value.get("stage_started").is_some());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&JobStatus::Success).unwrap(), "\"SUCCESS\"");
        assert_eq!("retrying".parse::<JobStatus>().unwrap(), JobStatus::Retrying);
    }
}
