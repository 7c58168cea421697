//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use reelcut_models::HighlightJob;
use reelcut_queue::{JobQueue, QueuedJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::HighlightPipeline;
use crate::retry::FailureTracker;

/// Most jobs taken from the stream in one read.
const MAX_BATCH: usize = 5;

/// Whether a reclaimed job has crashed workers too often to run again.
///
/// The tighter of the queue-wide limit and the job's own budget applies.
pub fn should_dead_letter(job: &HighlightJob, queue_max_retries: u32) -> bool {
    job.retry_count > queue_max_retries.min(job.max_retries)
}

/// Pulls highlight jobs from the queue and runs them on the pipeline.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    pipeline: Arc<HighlightPipeline>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue, pipeline: HighlightPipeline) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            pipeline: Arc::new(pipeline),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Consume jobs until [`JobExecutor::shutdown`] is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_concurrent = self.config.max_concurrent_jobs,
            "Starting job executor"
        );

        self.queue.init().await?;

        let claim_task = tokio::spawn(Self::claim_loop(
            Arc::clone(&self.queue),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.job_semaphore),
            self.consumer_name.clone(),
            self.config.claim_interval,
            self.config.claim_min_idle,
            self.shutdown.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut failures = FailureTracker::new(3);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    match result {
                        Ok(()) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!(error = %e, "Error consuming jobs");
                            }
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "In-flight jobs still running at shutdown; they will be reclaimed"
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(MAX_BATCH))
            .await?;
        if jobs.is_empty() {
            return Ok(());
        }
        debug!(count = jobs.len(), "Consumed jobs from queue");

        for queued in jobs {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;
            let queue = Arc::clone(&self.queue);
            let pipeline = Arc::clone(&self.pipeline);

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(queue, pipeline, queued).await;
            });
        }

        Ok(())
    }

    async fn claim_loop(
        queue: Arc<JobQueue>,
        pipeline: Arc<HighlightPipeline>,
        semaphore: Arc<Semaphore>,
        consumer_name: String,
        interval: Duration,
        min_idle: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        let mut failures = FailureTracker::new(3);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let claimed = queue
                        .claim_pending(&consumer_name, min_idle.as_millis() as u64, MAX_BATCH)
                        .await;
                    match claimed {
                        Ok(jobs) => {
                            failures.record_success();
                            if !jobs.is_empty() {
                                info!(count = jobs.len(), "Claimed pending jobs");
                            }
                            for queued in jobs {
                                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                    return;
                                };
                                let queue = Arc::clone(&queue);
                                let pipeline = Arc::clone(&pipeline);
                                tokio::spawn(async move {
                                    let _permit = permit;
                                    Self::execute_job(queue, pipeline, queued).await;
                                });
                            }
                        }
                        Err(e) => {
                            if failures.record_failure() {
                                warn!(error = %e, "Failed to claim pending jobs");
                            }
                        }
                    }
                }
            }
        }
    }

    /// Run one job and settle its stream entry.
    ///
    /// Terminal outcomes (success or recorded failure) are acked. When the
    /// job record cannot be written the entry stays pending so another
    /// worker can reclaim it.
    async fn execute_job(queue: Arc<JobQueue>, pipeline: Arc<HighlightPipeline>, queued: QueuedJob) {
        let QueuedJob {
            message_id,
            job,
            reclaimed,
        } = queued;
        let job_id = job.job_id.clone();

        if reclaimed && should_dead_letter(&job, queue.max_retries()) {
            warn!(
                job_id = %job_id,
                deliveries = job.retry_count,
                max_retries = queue.max_retries(),
                "Job exceeded max retries, moving to DLQ"
            );
            let reason = format!(
                "Job was delivered {} times without finishing",
                job.retry_count
            );
            if let Err(e) = pipeline.abandon(&job, &reason).await {
                error!(job_id = %job_id, error = %e, "Failed to mark abandoned job");
            }
            if let Err(e) = queue.dlq(&message_id, &job, &reason).await {
                error!(job_id = %job_id, error = %e, "Failed to move job to DLQ");
            }
            return;
        }

        info!(job_id = %job_id, reclaimed, "Executing job");
        match pipeline.run(&job, reclaimed).await {
            Ok(record) => {
                info!(job_id = %job_id, status = %record.status, "Job finished");
                if let Err(e) = queue.ack(&message_id).await {
                    error!(job_id = %job_id, error = %e, "Failed to ack job");
                }
            }
            Err(e) => {
                error!(
                    job_id = %job_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Job could not be recorded; leaving it for reclaim"
                );
            }
        }
    }

    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcut_models::JobId;

    #[test]
    fn test_dead_letter_after_max_retries() {
        let mut job = HighlightJob::new(JobId::from_string("dlq"), 30.0, vec!["/in/a.mp4".into()]);

        job.retry_count = 3;
        assert!(!should_dead_letter(&job, 3));

        job.retry_count = 4;
        assert!(should_dead_letter(&job, 3));
        assert!(should_dead_letter(&job, 5));

        job.max_retries = 6;
        assert!(!should_dead_letter(&job, 5));
    }

    #[test]
    fn test_job_budget_tighter_than_queue() {
        let mut job = HighlightJob::new(JobId::from_string("tight"), 30.0, vec!["/in/a.mp4".into()]);
        job.max_retries = 1;

        job.retry_count = 1;
        assert!(!should_dead_letter(&job, 3));
        job.retry_count = 2;
        assert!(should_dead_letter(&job, 3));
    }
}
