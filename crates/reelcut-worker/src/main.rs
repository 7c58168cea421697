//! Highlight worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reelcut_media::{
    AudioMixer, MediaTools, ProceduralMusicGenerator, ProfanityDetector, SignalScorer,
    TranscriptProfanityDetector,
};
use reelcut_ml_client::{EventDetectorConfig, HttpEventDetector};
use reelcut_queue::{JobQueue, JobStore, MemoryJobStore, QueueConfig, RedisJobStore};
use reelcut_storage::{BlobStore, LocalBlobStore, R2BlobStore, R2Client};
use reelcut_worker::{
    metrics, FfmpegBackend, HighlightPipeline, JobExecutor, JobStoreKind, PipelineSettings,
    StorageBackend, WorkerConfig,
};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Worker error: {:#}", e);
        eprintln!("reelcut-worker: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() -> anyhow::Result<()> {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("reelcut=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

fn build_pipeline(config: &WorkerConfig, queue_config: &QueueConfig) -> anyhow::Result<HighlightPipeline> {
    let tools = MediaTools::discover(config.retry_policy()).context("ffmpeg tools unavailable")?;

    let mut scorer = SignalScorer::new(tools.clone());
    if let Some(detector_config) = EventDetectorConfig::from_env() {
        info!(url = %detector_config.base_url, "Using remote event detector");
        scorer = scorer.with_event_detector(Arc::new(HttpEventDetector::new(detector_config)?));
    }

    let profanity: Arc<dyn ProfanityDetector> = match &config.profanity_words {
        Some(words) => Arc::new(TranscriptProfanityDetector::new(words)),
        None => Arc::new(TranscriptProfanityDetector::default()),
    };

    let backend = FfmpegBackend::new(
        tools.clone(),
        scorer,
        Arc::new(ProceduralMusicGenerator::new(tools.clone())),
        profanity,
        AudioMixer::new(tools, config.mix_options()),
    );

    let store: Arc<dyn JobStore> = match config.job_store {
        JobStoreKind::Redis => Arc::new(RedisJobStore::new(&queue_config.redis_url)?),
        JobStoreKind::Memory => Arc::new(MemoryJobStore::new()),
    };

    let blobs: Arc<dyn BlobStore> = match config.storage_backend {
        StorageBackend::Local => Arc::new(LocalBlobStore::new(&config.storage_local_root)),
        StorageBackend::R2 => Arc::new(
            R2BlobStore::new(R2Client::from_env()?).with_url_expiry(config.storage_url_expiry),
        ),
    };
    info!(store = blobs.name(), "Output storage ready");

    Ok(
        HighlightPipeline::new(Arc::new(backend), store, PipelineSettings::from_config(config))
            .with_blob_store(blobs),
    )
}

async fn run() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting reelcut-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        metrics::init_metrics(port)?;
        info!(port, "Prometheus exporter listening");
    }

    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| format!("cannot create work dir {}", config.work_dir.display()))?;

    let queue_config = QueueConfig::from_env();
    let pipeline = build_pipeline(&config, &queue_config)?;
    let queue = JobQueue::new(queue_config)?;
    let executor = Arc::new(JobExecutor::new(config, queue, pipeline));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    executor.run().await?;

    info!("Worker shutdown complete");
    Ok(())
}
