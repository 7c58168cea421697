//! Structured job logging utilities.

use tracing::{error, info, warn, Span};

use reelcut_models::JobId;

/// Job-scoped logger carrying the job ID and the current operation.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, stage: &str, percent: u8, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage,
            percent,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, stage: &str, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, stage: &str, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span to instrument the whole job with.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::from_string("job-42");
        let logger = JobLogger::new(&job_id, "highlight");

        assert_eq!(logger.job_id(), "job-42");
        assert_eq!(logger.operation(), "highlight");
    }
}
