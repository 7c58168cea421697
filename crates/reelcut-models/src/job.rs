//! Highlight job payloads carried on the work queue.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::Preset;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A highlight job to be processed by the worker.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HighlightJob {
    /// Unique job ID
    pub job_id: JobId,

    /// Target highlight length in seconds
    pub target_duration: f64,

    /// Uploaded source clips, in upload order
    pub input_files: Vec<PathBuf>,

    /// Presets to render (empty means the worker default)
    #[serde(default)]
    pub presets: Vec<Preset>,

    /// Per-job watermark override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark_text: Option<String>,

    /// Number of delivery attempts so far
    #[serde(default)]
    pub retry_count: u32,

    /// Maximum deliveries before dead-lettering
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

fn default_max_retries() -> u32 {
    3
}

impl HighlightJob {
    /// Create a job for the given inputs.
    pub fn new(job_id: JobId, target_duration: f64, input_files: Vec<PathBuf>) -> Self {
        Self {
            job_id,
            target_duration,
            input_files,
            presets: Vec::new(),
            watermark_text: None,
            retry_count: 0,
            max_retries: default_max_retries(),
            created_at: Utc::now(),
        }
    }

    pub fn with_presets(mut self, presets: Vec<Preset>) -> Self {
        self.presets = presets;
        self
    }

    pub fn with_watermark(mut self, text: impl Into<String>) -> Self {
        self.watermark_text = Some(text.into());
        self
    }

    /// Key used to drop duplicate submissions of the same job.
    pub fn idempotency_key(&self) -> String {
        format!("highlight:{}", self.job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation() {
        let job = HighlightJob::new(JobId::from_string("job-1"), 20.0, vec!["a.mp4".into()])
            .with_presets(vec![Preset::Portrait]);

        assert_eq!(job.idempotency_key(), "highlight:job-1");
        assert_eq!(job.presets, vec![Preset::Portrait]);
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn test_payload_defaults() {
        let json = r#"{
            "job_id": "job-2",
            "target_duration": 15.0,
            "input_files": ["/uploads/x.mp4"],
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let job: HighlightJob = serde_json::from_str(json).unwrap();
        assert!(job.presets.is_empty());
        assert!(job.watermark_text.is_none());
        assert_eq!(job.max_retries, 3);
    }
}
