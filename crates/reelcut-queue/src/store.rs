//! Job-state store.
//!
//! Records are read by clients polling job status and written only by the
//! worker that owns the job. Writes are last-writer-wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use reelcut_models::{JobId, JobProgress, JobRecord, JobStatus, JobUpdate};

use crate::error::{QueueError, QueueResult};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record; fails if the job already exists.
    async fn create(&self, record: JobRecord) -> QueueResult<()>;

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobRecord>>;

    /// Apply a patch and return the updated record.
    async fn update(&self, job_id: &JobId, update: JobUpdate) -> QueueResult<JobRecord>;
}

/// In-process store, also keeping every written version of each record.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
    history: RwLock<HashMap<JobId, Vec<JobRecord>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All versions of a record in write order.
    pub async fn history(&self, job_id: &JobId) -> Vec<JobRecord> {
        self.history
            .read()
            .await
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn remember(&self, record: &JobRecord) {
        self.history
            .write()
            .await
            .entry(record.job_id.clone())
            .or_default()
            .push(record.clone());
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, record: JobRecord) -> QueueResult<()> {
        {
            let mut records = self.records.write().await;
            if records.contains_key(&record.job_id) {
                return Err(QueueError::DuplicateJob(record.job_id.to_string()));
            }
            records.insert(record.job_id.clone(), record.clone());
        }
        self.remember(&record).await;
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobRecord>> {
        Ok(self.records.read().await.get(job_id).cloned())
    }

    async fn update(&self, job_id: &JobId, update: JobUpdate) -> QueueResult<JobRecord> {
        let updated = {
            let mut records = self.records.write().await;
            let record = records
                .get_mut(job_id)
                .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
            record.apply(update)?;
            record.clone()
        };
        self.remember(&updated).await;
        Ok(updated)
    }
}

/// Redis hash per job (`<prefix><job_id>`), JSON-encoded nested fields.
pub struct RedisJobStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisJobStore {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            key_prefix: "reelcut:job:".to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn key(&self, job_id: &JobId) -> String {
        format!("{}{}", self.key_prefix, job_id)
    }

    async fn write(&self, record: &JobRecord) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let fields = record_to_fields(record)?;
        let _: () = conn.hset_multiple(self.key(&record.job_id), &fields[..]).await?;
        debug!(job_id = %record.job_id, status = %record.status, "Persisted job record");
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, record: JobRecord) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = conn.exists(self.key(&record.job_id)).await?;
        if exists {
            return Err(QueueError::DuplicateJob(record.job_id.to_string()));
        }
        self.write(&record).await
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(self.key(job_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        record_from_fields(job_id, &fields).map(Some)
    }

    async fn update(&self, job_id: &JobId, update: JobUpdate) -> QueueResult<JobRecord> {
        let mut record = self
            .get(job_id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        record.apply(update)?;
        self.write(&record).await?;
        Ok(record)
    }
}

fn optional_time(value: Option<DateTime<Utc>>) -> String {
    value.map(|t| t.to_rfc3339()).unwrap_or_default()
}

/// Flatten a record into hash fields.
pub fn record_to_fields(record: &JobRecord) -> QueueResult<Vec<(&'static str, String)>> {
    Ok(vec![
        ("status", record.status.as_str().to_string()),
        ("stage", record.stage.clone()),
        ("progress", serde_json::to_string(&record.progress)?),
        ("target_duration", record.target_duration.to_string()),
        ("error", record.error.clone().unwrap_or_default()),
        ("error_detail", serde_json::to_string(&record.error_detail)?),
        ("outputs", serde_json::to_string(&record.outputs)?),
        ("started_at", optional_time(record.started_at)),
        ("finished_at", optional_time(record.finished_at)),
        ("updated_at", record.updated_at.to_rfc3339()),
    ])
}

/// Rebuild a record from hash fields.
pub fn record_from_fields(
    job_id: &JobId,
    fields: &HashMap<String, String>,
) -> QueueResult<JobRecord> {
    let id = job_id.to_string();
    let field = |name: &str| fields.get(name).map(String::as_str).unwrap_or("");
    let time = |name: &str| -> QueueResult<Option<DateTime<Utc>>> {
        match field(name) {
            "" => Ok(None),
            raw => DateTime::parse_from_rfc3339(raw)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|e| QueueError::corrupt(&id, format!("{}: {}", name, e))),
        }
    };

    let status: JobStatus = field("status")
        .parse()
        .map_err(|e: String| QueueError::corrupt(&id, e))?;
    let target_duration = field("target_duration")
        .parse()
        .map_err(|_| QueueError::corrupt(&id, "target_duration"))?;
    let json_or_default = |name: &str, default: &str| -> String {
        match field(name) {
            "" => default.to_string(),
            raw => raw.to_string(),
        }
    };

    Ok(JobRecord {
        job_id: job_id.clone(),
        status,
        stage: field("stage").to_string(),
        progress: match field("progress") {
            "" => JobProgress::default(),
            raw => serde_json::from_str(raw)
                .map_err(|e| QueueError::corrupt(&id, format!("progress: {}", e)))?,
        },
        target_duration,
        error: Some(field("error").to_string()).filter(|e| !e.is_empty()),
        error_detail: serde_json::from_str(&json_or_default("error_detail", "[]"))?,
        outputs: serde_json::from_str(&json_or_default("outputs", "{}"))?,
        started_at: time("started_at")?,
        finished_at: time("finished_at")?,
        updated_at: time("updated_at")?.unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcut_models::ErrorDetail;

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemoryJobStore::new();
        let job_id = JobId::from_string("job-1");
        store.create(JobRecord::new(job_id.clone(), 30.0)).await.unwrap();

        let dup = store.create(JobRecord::new(job_id.clone(), 30.0)).await;
        assert!(matches!(dup, Err(QueueError::DuplicateJob(_))));

        store
            .update(
                &job_id,
                JobUpdate::new()
                    .status(JobStatus::Processing)
                    .progress(JobProgress::new(5, "preprocess", "Normalizing")),
            )
            .await
            .unwrap();
        let done = store
            .update(&job_id, JobUpdate::new().status(JobStatus::Success))
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Success);

        let err = store
            .update(&job_id, JobUpdate::new().status(JobStatus::Processing))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition(_)));

        let history = store.history(&job_id).await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].stage, "preprocess");
    }

    #[tokio::test]
    async fn test_memory_store_unknown_job() {
        let store = MemoryJobStore::new();
        let missing = JobId::from_string("nope");
        assert!(store.get(&missing).await.unwrap().is_none());
        assert!(matches!(
            store.update(&missing, JobUpdate::new()).await,
            Err(QueueError::JobNotFound(_))
        ));
    }

    #[test]
    fn test_hash_fields_round_trip() {
        let job_id = JobId::from_string("job-2");
        let mut record = JobRecord::new(job_id.clone(), 45.0);
        record
            .apply(
                JobUpdate::new()
                    .status(JobStatus::Processing)
                    .started_now()
                    .append_error(ErrorDetail::warning("music", "no bed")),
            )
            .unwrap();
        record.outputs.insert("landscape".into(), "/out/final_landscape.mp4".into());

        let fields: HashMap<String, String> = record_to_fields(&record)
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(fields["status"], "PROCESSING");
        assert_eq!(fields["error"], "");
        assert!(fields["progress"].contains("\"percentage\""));

        let restored = record_from_fields(&job_id, &fields).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_corrupt_status_is_reported() {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), "EXPLODED".to_string());
        fields.insert("target_duration".to_string(), "30".to_string());
        let err = record_from_fields(&JobId::from_string("x"), &fields).unwrap_err();
        assert!(matches!(err, QueueError::CorruptRecord { .. }));
    }
}
