//! Persisted job progress.
//!
//! The reporter is the only writer of a job's record while the job runs.
//! Percentages never go backwards and error details are only appended.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use reelcut_models::{JobId, JobProgress, JobRecord, JobStatus, JobUpdate};
use reelcut_queue::{JobStore, QueueError};

use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_async_if, RetryConfig};
use crate::stages::{StageDescriptor, StageError, ALL_STAGES};

pub struct ProgressReporter {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    logger: JobLogger,
    last_percent: AtomicU8,
    /// Index into `ALL_STAGES`
    current_stage: AtomicUsize,
    write_retry: RetryConfig,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn JobStore>, job_id: JobId) -> Self {
        let logger = JobLogger::new(&job_id, "highlight");
        Self {
            store,
            job_id,
            logger,
            last_percent: AtomicU8::new(0),
            current_stage: AtomicUsize::new(0),
            write_retry: RetryConfig::new("job_store_write"),
        }
    }

    pub fn with_write_retry(mut self, config: RetryConfig) -> Self {
        self.write_retry = config;
        self
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    /// Last percentage written.
    pub fn percent(&self) -> u8 {
        self.last_percent.load(Ordering::SeqCst)
    }

    /// Stage of the most recent progress report.
    pub fn current_stage(&self) -> StageDescriptor {
        ALL_STAGES[self.current_stage.load(Ordering::SeqCst).min(ALL_STAGES.len() - 1)]
    }

    async fn write(&self, update: JobUpdate) -> WorkerResult<JobRecord> {
        let record = retry_async_if(&self.write_retry, QueueError::is_retryable, || {
            self.store.update(&self.job_id, update.clone())
        })
        .await?;
        Ok(record)
    }

    /// Move the job to PROCESSING, through RETRYING when it was reclaimed.
    pub async fn start(&self, reclaimed: bool) -> WorkerResult<JobRecord> {
        if reclaimed {
            self.write(JobUpdate::new().status(JobStatus::Retrying)).await?;
            self.logger.log_warning("start", "Resuming job abandoned by another worker");
        }
        let record = self
            .write(
                JobUpdate::new()
                    .status(JobStatus::Processing)
                    .progress(JobProgress::new(0, "collect", "Starting"))
                    .started_now(),
            )
            .await?;
        self.last_percent.store(0, Ordering::SeqCst);
        self.logger.log_start("highlight pipeline");
        Ok(record)
    }

    /// Persist progress within `stage`; lower percentages are raised to the last one written.
    pub async fn report(&self, stage: &StageDescriptor, fraction: f64, message: &str) {
        let target = stage.percent_at(fraction);
        let previous = self.last_percent.fetch_max(target, Ordering::SeqCst);
        let percent = previous.max(target);
        if let Some(idx) = ALL_STAGES.iter().position(|s| s.name == stage.name) {
            self.current_stage.store(idx, Ordering::SeqCst);
        }

        self.logger.log_progress(stage.name, percent, message);
        let update = JobUpdate::new().progress(JobProgress::new(percent, stage.name, message));
        if let Err(e) = self.write(update).await {
            self.logger
                .log_warning(stage.name, &format!("Failed to persist progress: {}", e));
        }
    }

    pub async fn stage_started(&self, stage: &StageDescriptor, message: &str) {
        self.report(stage, 0.0, message).await;
    }

    pub async fn stage_finished(&self, stage: &StageDescriptor, message: &str) {
        self.report(stage, 1.0, message).await;
    }

    /// Record a non-fatal failure and keep going.
    pub async fn warn(&self, stage: &StageDescriptor, err: &StageError) {
        self.logger.log_warning(stage.name, &err.diagnostics);
        metrics::record_stage_warning(stage.name);
        let update = JobUpdate::new().append_error(err.to_detail(false));
        if let Err(e) = self.write(update).await {
            self.logger
                .log_warning(stage.name, &format!("Failed to persist warning: {}", e));
        }
    }

    /// Terminal failure.
    pub async fn fail(&self, stage: &StageDescriptor, err: &StageError) -> WorkerResult<JobRecord> {
        self.logger.log_error(stage.name, &err.diagnostics);
        metrics::record_job_failed(stage.name);
        let percent = self.percent();
        self.write(
            JobUpdate::new()
                .status(JobStatus::Failed)
                .progress(JobProgress::new(percent, stage.name, err.message.clone()))
                .error(err.message.clone())
                .append_error(err.to_detail(true))
                .finished_now(),
        )
        .await
    }

    /// Terminal success with the public reference of each output.
    pub async fn succeed(&self, outputs: BTreeMap<String, String>) -> WorkerResult<JobRecord> {
        self.last_percent.store(100, Ordering::SeqCst);
        let record = self
            .write(
                JobUpdate::new()
                    .status(JobStatus::Success)
                    .progress(JobProgress::new(100, "done", "Highlight ready"))
                    .outputs(outputs)
                    .finished_now(),
            )
            .await?;
        metrics::record_job_completed();
        self.logger
            .log_completion(&format!("{} output(s)", record.outputs.len()));
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{DETECT, MUSIC, PREPROCESS, RENDER};
    use reelcut_models::ErrorCategory;
    use crate::error::WorkerError;
    use reelcut_queue::MemoryJobStore;
    use std::time::Duration;

    async fn setup(job: &str) -> (Arc<MemoryJobStore>, ProgressReporter) {
        let store = Arc::new(MemoryJobStore::new());
        let job_id = JobId::from_string(job);
        store.create(JobRecord::new(job_id.clone(), 30.0)).await.unwrap();
        let reporter = ProgressReporter::new(store.clone(), job_id);
        (store, reporter)
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let (store, reporter) = setup("mono").await;
        reporter.start(false).await.unwrap();

        reporter.report(&RENDER, 0.5, "Rendering").await;
        reporter.report(&PREPROCESS, 1.0, "Late preprocess note").await;
        reporter.report(&DETECT, 0.0, "Detecting").await;

        let percents: Vec<u8> = store
            .history(reporter.job_id())
            .await
            .iter()
            .map(|r| r.progress.percentage)
            .collect();
        assert_eq!(percents, vec![0, 0, 65, 65, 65]);
        assert_eq!(reporter.current_stage().name, "detect");
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_missing_record_fails_without_retrying() {
        let store = Arc::new(MemoryJobStore::new());
        let reporter = ProgressReporter::new(store, JobId::from_string("never-created"))
            .with_write_retry(
                RetryConfig::new("job_store_write")
                    .with_max_retries(3)
                    .with_base_delay(Duration::from_secs(2)),
            );

        let result = tokio::time::timeout(Duration::from_millis(500), reporter.start(false))
            .await
            .expect("permanent store errors must not be retried");
        assert!(matches!(
            result,
            Err(WorkerError::Queue(QueueError::JobNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_reclaimed_job_passes_through_retrying() {
        let (store, reporter) = setup("reclaimed").await;
        reporter.start(true).await.unwrap();

        let statuses: Vec<JobStatus> = store
            .history(reporter.job_id())
            .await
            .iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Pending, JobStatus::Retrying, JobStatus::Processing]
        );
    }

    #[tokio::test]
    async fn test_warning_then_failure() {
        let (_store, reporter) = setup("fails").await;
        reporter.start(false).await.unwrap();

        reporter
            .warn(&MUSIC, &StageError::new(&MUSIC, "Music generation failed."))
            .await;
        let record = reporter
            .fail(
                &RENDER,
                &StageError::new(&RENDER, "Rendering failed.").with_diagnostics("ffmpeg exit 1"),
            )
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("Rendering failed."));
        assert_eq!(record.error_detail.len(), 2);
        assert_eq!(record.error_detail[0].category, ErrorCategory::Warning);
        assert_eq!(record.error_detail[1].category, ErrorCategory::Critical);
        assert_eq!(record.error_detail[1].error, "ffmpeg exit 1");
        assert!(record.finished_at.is_some());
    }
}
