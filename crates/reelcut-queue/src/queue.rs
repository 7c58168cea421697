//! Job queue using Redis Streams.

use std::path::PathBuf;
use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use reelcut_models::{HighlightJob, JobId, JobRecord};

use crate::error::{QueueError, QueueResult};
use crate::store::JobStore;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Deliveries beyond the first before a job is dead-lettered
    pub max_retries: u32,
    /// Job visibility timeout
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "reelcut:jobs".to_string(),
            consumer_group: "reelcut:workers".to_string(),
            dlq_stream_name: "reelcut:dlq".to_string(),
            max_retries: 3,
            visibility_timeout: Duration::from_secs(600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
        }
    }
}

/// A job read from the stream.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub message_id: String,
    pub job: HighlightJob,
    /// True when taken over from a consumer that stopped acknowledging
    pub reclaimed: bool,
}

/// Check a payload before it is enqueued.
pub fn validate_job(job: &HighlightJob) -> QueueResult<()> {
    if !job.target_duration.is_finite() || job.target_duration <= 0.0 {
        return Err(QueueError::InvalidJob(format!(
            "target duration must be positive, got {}",
            job.target_duration
        )));
    }
    Ok(())
}

fn parse_entry(map: &std::collections::HashMap<String, redis::Value>) -> Option<Result<HighlightJob, serde_json::Error>> {
    match map.get("job") {
        Some(redis::Value::BulkString(payload)) => Some(serde_json::from_slice(payload)),
        _ => None,
    }
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Create the consumer group if it does not exist.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Register a new job: PENDING record first, then the stream entry.
    pub async fn submit_job(
        &self,
        store: &dyn JobStore,
        job_id: JobId,
        target_duration: f64,
        input_files: Vec<PathBuf>,
    ) -> QueueResult<HighlightJob> {
        let job = HighlightJob::new(job_id, target_duration, input_files);
        self.submit(store, &job).await?;
        Ok(job)
    }

    /// Like [`submit_job`](Self::submit_job) for a fully built payload.
    pub async fn submit(&self, store: &dyn JobStore, job: &HighlightJob) -> QueueResult<String> {
        validate_job(job)?;
        store
            .create(JobRecord::new(job.job_id.clone(), job.target_duration))
            .await?;
        self.enqueue(job).await
    }

    /// Add a payload to the stream, rejecting duplicates for an hour.
    pub async fn enqueue(&self, job: &HighlightJob) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        let idempotency_key = job.idempotency_key();

        let dedup_key = format!("reelcut:dedup:{}", idempotency_key);
        let fresh: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(3600)
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !fresh {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::DuplicateJob(job.job_id.to_string()));
        }

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await?;

        info!(job_id = %job.job_id, message_id = %message_id, "Enqueued highlight job");
        Ok(message_id)
    }

    /// Acknowledge and remove a message.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job: {}", message_id);
        Ok(())
    }

    /// Move a job to the dead letter queue.
    pub async fn dlq(&self, message_id: &str, job: &HighlightJob, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!(job_id = %job.job_id, error, "Moved job to DLQ");
        Ok(())
    }

    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    pub async fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Read new jobs for this consumer, blocking up to `block_ms`.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<QueuedJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();
        for stream_key in result.map(|r| r.keys).unwrap_or_default() {
            for entry in stream_key.ids {
                match parse_entry(&entry.map) {
                    Some(Ok(job)) => {
                        debug!(job_id = %job.job_id, "Consumed job from stream");
                        jobs.push(QueuedJob {
                            message_id: entry.id,
                            job,
                            reclaimed: false,
                        });
                    }
                    Some(Err(e)) => {
                        warn!("Failed to parse job payload: {}", e);
                        self.ack(&entry.id).await.ok();
                    }
                    None => {
                        warn!(message_id = %entry.id, "Stream entry without job payload");
                        self.ack(&entry.id).await.ok();
                    }
                }
            }
        }

        Ok(jobs)
    }

    /// Take over jobs whose consumer has been silent for `min_idle_ms`.
    ///
    /// The payload's `retry_count` is raised to the number of earlier
    /// deliveries so callers can dead-letter jobs that keep crashing workers.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<QueuedJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let deliveries: std::collections::HashMap<String, usize> = pending
            .ids
            .iter()
            .map(|p| (p.id.clone(), p.times_delivered))
            .collect();

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms);
        for p in &pending.ids {
            cmd.arg(&p.id);
        }
        let result: redis::streams::StreamClaimReply = cmd.query_async(&mut conn).await?;

        let mut jobs = Vec::new();
        for entry in result.ids {
            match parse_entry(&entry.map) {
                Some(Ok(mut job)) => {
                    let earlier = deliveries.get(&entry.id).copied().unwrap_or(1);
                    job.retry_count = job.retry_count.max(earlier as u32);
                    info!(
                        job_id = %job.job_id,
                        deliveries = earlier,
                        "Claimed pending job from stream"
                    );
                    jobs.push(QueuedJob {
                        message_id: entry.id,
                        job,
                        reclaimed: true,
                    });
                }
                _ => {
                    warn!(message_id = %entry.id, "Dropping unreadable claimed entry");
                    self.ack(&entry.id).await.ok();
                }
            }
        }

        Ok(jobs)
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;

    #[test]
    fn test_config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "reelcut:jobs");
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_validate_job() {
        let ok = HighlightJob::new(JobId::from_string("a"), 30.0, vec![]);
        assert!(validate_job(&ok).is_ok());

        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let job = HighlightJob::new(JobId::from_string("b"), bad, vec![]);
            assert!(matches!(validate_job(&job), Err(QueueError::InvalidJob(_))));
        }
    }

    #[test]
    fn test_parse_entry() {
        let job = HighlightJob::new(JobId::from_string("c"), 20.0, vec!["/in/a.mp4".into()]);
        let mut map = std::collections::HashMap::new();
        map.insert(
            "job".to_string(),
            redis::Value::BulkString(serde_json::to_vec(&job).unwrap()),
        );
        let parsed = parse_entry(&map).unwrap().unwrap();
        assert_eq!(parsed.job_id, job.job_id);
        assert_eq!(parsed.input_files, job.input_files);

        map.insert("job".to_string(), redis::Value::BulkString(b"{".to_vec()));
        assert!(parse_entry(&map).unwrap().is_err());
        assert!(parse_entry(&std::collections::HashMap::new()).is_none());
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_before_writing_record() {
        let queue = JobQueue::new(QueueConfig {
            redis_url: "redis://127.0.0.1:1".to_string(),
            ..QueueConfig::default()
        })
        .unwrap();
        let store = MemoryJobStore::new();
        let err = queue
            .submit_job(&store, JobId::from_string("d"), 0.0, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidJob(_)));
        assert!(store.get(&JobId::from_string("d")).await.unwrap().is_none());
    }
}
