//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reelcut_media::{DuckingMode, MixOptions, RetryPolicy, DEFAULT_MAX_TAKE_SECS, DEFAULT_MUSIC_GAIN};
use reelcut_models::Preset;

/// Where finished artifacts are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    R2,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "r2" => Ok(StorageBackend::R2),
            other => Err(format!("Unknown storage backend: {}", other)),
        }
    }
}

/// Where job records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStoreKind {
    Redis,
    Memory,
}

impl FromStr for JobStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(JobStoreKind::Redis),
            "memory" => Ok(JobStoreKind::Memory),
            other => Err(format!("Unknown job store: {}", other)),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Parent of the per-job working directories
    pub work_dir: PathBuf,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery)
    pub claim_min_idle: Duration,

    /// Presets rendered when a job does not name any
    pub presets: Vec<Preset>,
    pub max_take_secs: f64,
    /// Watermark used when a job does not carry its own
    pub watermark_text: Option<String>,
    pub music_gain: f64,
    pub ducking: DuckingMode,
    /// Blocklist override; `None` keeps the built-in list
    pub profanity_words: Option<Vec<String>>,

    pub ffmpeg_retries: u32,
    pub ffmpeg_base_delay: Duration,
    pub ffmpeg_timeout: Duration,

    pub storage_backend: StorageBackend,
    pub storage_local_root: PathBuf,
    pub storage_url_expiry: Duration,
    pub job_store: JobStoreKind,

    /// Prometheus listener port; metrics are not exported when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: PathBuf::from("/tmp/reelcut"),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            presets: Preset::DEFAULT.to_vec(),
            max_take_secs: DEFAULT_MAX_TAKE_SECS,
            watermark_text: None,
            music_gain: DEFAULT_MUSIC_GAIN,
            ducking: DuckingMode::Static,
            profanity_words: None,
            ffmpeg_retries: 3,
            ffmpeg_base_delay: Duration::from_millis(1000),
            ffmpeg_timeout: Duration::from_secs(3600),
            storage_backend: StorageBackend::Local,
            storage_local_root: PathBuf::from("/tmp/reelcut/outputs"),
            storage_url_expiry: Duration::from_secs(86_400),
            job_store: JobStoreKind::Redis,
            metrics_port: None,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Anchor a configured directory at the current working directory.
///
/// Paths under the work dir end up in ffconcat manifests, which resolve
/// relative entries against the manifest location.
pub fn absolute_dir(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::path::absolute(&path).unwrap_or(path)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let work_dir = env_string("WORKER_WORK_DIR")
            .map(PathBuf::from)
            .map(absolute_dir)
            .unwrap_or(defaults.work_dir);
        let storage_local_root = env_string("STORAGE_LOCAL_ROOT")
            .map(PathBuf::from)
            .map(absolute_dir)
            .unwrap_or_else(|| work_dir.join("outputs"));
        let presets = env_string("HIGHLIGHT_PRESETS")
            .map(|s| Preset::parse_list(&s))
            .filter(|p| !p.is_empty())
            .unwrap_or(defaults.presets);

        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            job_timeout: env_parse("WORKER_JOB_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            work_dir,
            claim_interval: env_parse("WORKER_CLAIM_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_parse("WORKER_CLAIM_MIN_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
            presets,
            max_take_secs: env_parse("HIGHLIGHT_MAX_TAKE_SECS")
                .filter(|v: &f64| *v >= 1.0)
                .unwrap_or(defaults.max_take_secs),
            watermark_text: env_string("WATERMARK_TEXT"),
            music_gain: env_parse("MUSIC_GAIN")
                .filter(|v: &f64| (0.0..=1.0).contains(v))
                .unwrap_or(defaults.music_gain),
            ducking: env_parse("DUCKING_MODE").unwrap_or(defaults.ducking),
            profanity_words: env_string("PROFANITY_WORDS").map(|s| {
                s.split(',')
                    .map(|w| w.trim().to_string())
                    .filter(|w| !w.is_empty())
                    .collect()
            }),
            ffmpeg_retries: env_parse("FFMPEG_RETRIES").unwrap_or(defaults.ffmpeg_retries),
            ffmpeg_base_delay: env_parse("FFMPEG_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.ffmpeg_base_delay),
            ffmpeg_timeout: env_parse("FFMPEG_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            storage_backend: env_parse("STORAGE_BACKEND").unwrap_or(defaults.storage_backend),
            storage_local_root,
            storage_url_expiry: env_parse("STORAGE_URL_EXPIRES_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.storage_url_expiry),
            job_store: env_parse("JOB_STORE").unwrap_or(defaults.job_store),
            metrics_port: env_parse("METRICS_PORT"),
        }
    }

    /// Executor policy for every ffmpeg/ffprobe invocation.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(self.ffmpeg_retries)
            .with_base_delay(self.ffmpeg_base_delay)
            .with_timeout(self.ffmpeg_timeout)
    }

    pub fn mix_options(&self) -> MixOptions {
        MixOptions {
            music_gain: self.music_gain,
            ducking: self.ducking,
            ..MixOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.presets, vec![Preset::Landscape, Preset::Portrait]);
        assert_eq!(config.max_take_secs, 4.0);
        assert_eq!(config.retry_policy().max_retries, 3);
        assert_eq!(config.mix_options().music_gain, 0.2);
    }

    #[test]
    fn test_relative_work_dir_is_anchored() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(
            absolute_dir(PathBuf::from("scratch/reelcut")),
            cwd.join("scratch/reelcut")
        );
        assert_eq!(
            absolute_dir(PathBuf::from("/var/reelcut")),
            PathBuf::from("/var/reelcut")
        );
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("R2".parse::<StorageBackend>().unwrap(), StorageBackend::R2);
        assert_eq!(" memory ".parse::<JobStoreKind>().unwrap(), JobStoreKind::Memory);
        assert!("s3".parse::<StorageBackend>().is_err());
    }
}
