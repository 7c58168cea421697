//! Highlight job orchestration.
//!
//! Stages run in a fixed order, each owning a slice of the progress bar:
//! collect, preprocess, detect (segment + score + select), render, music,
//! profanity, mix, upload. Critical stages end the job on failure; the
//! others record a warning and fall back to a degraded result.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn, Instrument};

use reelcut_media::segmenter::FALLBACK_SEGMENT_SECS;
use reelcut_media::{select, MuteSpan, DEFAULT_MAX_TAKE_SECS};
use reelcut_models::{
    ErrorDetail, HighlightJob, JobId, JobRecord, JobStatus, JobUpdate, Preset, ScoredSegment,
    Segment, Selection,
};
use reelcut_queue::JobStore;
use reelcut_storage::BlobStore;

use crate::backend::{MediaBackend, PreparedSource};
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::metrics;
use crate::progress::ProgressReporter;
use crate::stages::{
    StageDescriptor, StageError, COLLECT, DETECT, MIX, MUSIC, PREPROCESS, PROFANITY, RENDER,
    UPLOAD,
};

/// Knobs applied to every job.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    /// Presets rendered when the job names none
    pub presets: Vec<Preset>,
    pub max_take_secs: f64,
    /// Watermark used when the job carries none
    pub watermark_text: Option<String>,
    pub job_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/reelcut"),
            presets: Preset::DEFAULT.to_vec(),
            max_take_secs: DEFAULT_MAX_TAKE_SECS,
            watermark_text: None,
            job_timeout: Duration::from_secs(3600),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            presets: config.presets.clone(),
            max_take_secs: config.max_take_secs,
            watermark_text: config.watermark_text.clone(),
            job_timeout: config.job_timeout,
        }
    }
}

/// A failure that ends the job.
#[derive(Debug)]
struct CriticalFailure {
    stage: StageDescriptor,
    error: StageError,
}

impl CriticalFailure {
    fn new(stage: StageDescriptor, error: StageError) -> Self {
        Self { stage, error }
    }
}

/// Per-job scratch layout under `<work_dir>/<job_id>`.
struct JobDirs {
    root: PathBuf,
    input: PathBuf,
    export: PathBuf,
}

impl JobDirs {
    fn new(work_dir: &Path, job_id: &JobId) -> Self {
        let root = work_dir.join(job_id.as_str());
        Self {
            input: root.join("input"),
            export: root.join("export"),
            root,
        }
    }

    async fn create(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.input).await?;
        tokio::fs::create_dir_all(&self.export).await
    }
}

/// Runs highlight jobs end to end against a media backend.
pub struct HighlightPipeline {
    backend: Arc<dyn MediaBackend>,
    store: Arc<dyn JobStore>,
    blobs: Option<Arc<dyn BlobStore>>,
    settings: PipelineSettings,
}

impl HighlightPipeline {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        store: Arc<dyn JobStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            backend,
            store,
            blobs: None,
            settings,
        }
    }

    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Scratch directory owned by one job.
    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.settings.work_dir.join(job_id.as_str())
    }

    /// Run a job to a terminal state and return the final record.
    ///
    /// `Err` means the job record could not be written; the job is then
    /// left for another worker to reclaim.
    pub async fn run(&self, job: &HighlightJob, reclaimed: bool) -> WorkerResult<JobRecord> {
        match self.store.get(&job.job_id).await? {
            Some(record) if record.is_terminal() => {
                info!(job_id = %job.job_id, status = %record.status, "Job already finished");
                return Ok(record);
            }
            Some(_) => {}
            None => {
                self.store
                    .create(JobRecord::new(job.job_id.clone(), job.target_duration))
                    .await?;
            }
        }

        let reporter = ProgressReporter::new(Arc::clone(&self.store), job.job_id.clone());
        let span = reporter.logger().create_span();
        self.execute(job, reclaimed, &reporter).instrument(span).await
    }

    async fn execute(
        &self,
        job: &HighlightJob,
        reclaimed: bool,
        reporter: &ProgressReporter,
    ) -> WorkerResult<JobRecord> {
        reporter.start(reclaimed).await?;

        let dirs = JobDirs::new(&self.settings.work_dir, &job.job_id);
        let outcome =
            tokio::time::timeout(self.settings.job_timeout, self.run_stages(job, &dirs, reporter))
                .await;

        let (result, keep_export) = match outcome {
            Ok(Ok(outputs)) => {
                let keep = outputs
                    .values()
                    .any(|reference| Path::new(reference).starts_with(&dirs.root));
                (reporter.succeed(outputs).await, keep)
            }
            Ok(Err(failure)) => (reporter.fail(&failure.stage, &failure.error).await, false),
            Err(_) => {
                let stage = reporter.current_stage();
                let error = StageError::new(&stage, "Video processing took too long.")
                    .with_diagnostics(format!(
                        "job exceeded timeout of {}s during {}",
                        self.settings.job_timeout.as_secs(),
                        stage.name
                    ))
                    .retryable(true);
                (reporter.fail(&stage, &error).await, false)
            }
        };

        cleanup_job_dir(&dirs, keep_export).await;
        result
    }

    /// Mark a job that keeps crashing workers as failed without running it.
    pub async fn abandon(&self, job: &HighlightJob, reason: &str) -> WorkerResult<JobRecord> {
        if let Some(record) = self.store.get(&job.job_id).await? {
            if record.is_terminal() {
                return Ok(record);
            }
        } else {
            self.store
                .create(JobRecord::new(job.job_id.clone(), job.target_duration))
                .await?;
        }

        metrics::record_job_failed("queue");
        let record = self
            .store
            .update(
                &job.job_id,
                JobUpdate::new()
                    .status(JobStatus::Failed)
                    .error("The job failed repeatedly and was abandoned.")
                    .append_error(ErrorDetail::critical("queue", reason))
                    .finished_now(),
            )
            .await?;
        Ok(record)
    }

    async fn run_stages(
        &self,
        job: &HighlightJob,
        dirs: &JobDirs,
        reporter: &ProgressReporter,
    ) -> Result<BTreeMap<String, String>, CriticalFailure> {
        let inputs = self.collect(job, reporter).await?;

        dirs.create().await.map_err(|e| {
            CriticalFailure::new(
                PREPROCESS,
                StageError::new(&PREPROCESS, "Could not prepare the working directory.")
                    .with_diagnostics(format!("{}: {}", dirs.root.display(), e))
                    .retryable(true),
            )
        })?;

        let sources = self.preprocess(&inputs, dirs, reporter).await?;
        let selection = self.detect_and_select(job, &sources, reporter).await;
        let rendered = self.render(job, &selection, dirs, reporter).await?;
        let music = self.music(&selection, &rendered, dirs, reporter).await;
        let spans = self.profanity(&selection, reporter).await;
        let finals = self
            .mix(job, &rendered, music.as_deref(), &spans, dirs, reporter)
            .await;
        Ok(self.upload(&job.job_id, &finals, reporter).await)
    }

    async fn collect(
        &self,
        job: &HighlightJob,
        reporter: &ProgressReporter,
    ) -> Result<Vec<PathBuf>, CriticalFailure> {
        let started = Instant::now();
        reporter.stage_started(&COLLECT, "Collecting uploads").await;

        let mut usable = Vec::new();
        for input in &job.input_files {
            let problem = match tokio::fs::metadata(input).await {
                Ok(meta) if meta.is_file() && meta.len() > 0 => {
                    usable.push(input.clone());
                    continue;
                }
                Ok(_) => "is empty or not a regular file".to_string(),
                Err(e) => e.to_string(),
            };
            let err = StageError::new(&COLLECT, "An uploaded file could not be used.")
                .with_diagnostics(format!("{}: {}", input.display(), problem));
            reporter.warn(&COLLECT, &err).await;
        }

        if usable.is_empty() {
            return Err(CriticalFailure::new(
                COLLECT,
                StageError::new(&COLLECT, "No usable input files were provided.").with_diagnostics(
                    format!("{} input(s) submitted, none usable", job.input_files.len()),
                ),
            ));
        }

        finish_stage(reporter, &COLLECT, started, &format!("{} upload(s)", usable.len())).await;
        Ok(usable)
    }

    async fn preprocess(
        &self,
        inputs: &[PathBuf],
        dirs: &JobDirs,
        reporter: &ProgressReporter,
    ) -> Result<Vec<PreparedSource>, CriticalFailure> {
        let started = Instant::now();
        reporter.stage_started(&PREPROCESS, "Normalizing uploads").await;

        let mut sources = Vec::new();
        let mut last_error = None;
        for (idx, input) in inputs.iter().enumerate() {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "source".to_string());
            let output = dirs.input.join(format!("{:02}_{}.mp4", idx, stem));

            match self.backend.preprocess(input, &output).await {
                Ok(source) => sources.push(source),
                Err(e) => {
                    let err = StageError::from_media(&PREPROCESS, &e);
                    reporter.warn(&PREPROCESS, &err).await;
                    last_error = Some(err);
                }
            }
            let fraction = (idx + 1) as f64 / inputs.len() as f64;
            reporter
                .report(&PREPROCESS, fraction, &format!("Normalized {}/{}", idx + 1, inputs.len()))
                .await;
        }

        if sources.is_empty() {
            let error = last_error
                .unwrap_or_else(|| StageError::new(&PREPROCESS, "No uploads could be prepared."));
            return Err(CriticalFailure::new(PREPROCESS, error));
        }

        finish_stage(reporter, &PREPROCESS, started, "Uploads normalized").await;
        Ok(sources)
    }

    async fn detect_and_select(
        &self,
        job: &HighlightJob,
        sources: &[PreparedSource],
        reporter: &ProgressReporter,
    ) -> Selection {
        let started = Instant::now();
        reporter.stage_started(&DETECT, "Finding the best moments").await;

        let mut candidates: Vec<ScoredSegment> = Vec::new();
        for (idx, source) in sources.iter().enumerate() {
            let detected = match self.backend.detect_segments(&source.path).await {
                Ok(segments) => segments,
                Err(e) => {
                    reporter.warn(&DETECT, &StageError::from_media(&DETECT, &e)).await;
                    vec![Segment::new(&source.path, 0.0, FALLBACK_SEGMENT_SECS)]
                }
            };
            let segments: Vec<Segment> = detected
                .iter()
                .filter_map(|s| s.clipped_to(source.duration))
                .collect();
            debug!(
                source = %source.path.display(),
                detected = detected.len(),
                usable = segments.len(),
                "Segmented source"
            );

            candidates.extend(self.backend.score_segments(&source.path, &segments).await);

            let fraction = (idx + 1) as f64 / sources.len() as f64;
            reporter
                .report(&DETECT, fraction, &format!("Scored {}/{} sources", idx + 1, sources.len()))
                .await;
        }

        let selection = select(
            &candidates,
            job.target_duration,
            self.settings.max_take_secs,
            sources.first().map(|s| s.path.as_path()),
        );
        info!(
            candidates = candidates.len(),
            takes = selection.len(),
            total = selection.total_duration(),
            target = job.target_duration,
            "Selected highlight takes"
        );

        finish_stage(
            reporter,
            &DETECT,
            started,
            &format!("Selected {} takes", selection.len()),
        )
        .await;
        selection
    }

    async fn render(
        &self,
        job: &HighlightJob,
        selection: &Selection,
        dirs: &JobDirs,
        reporter: &ProgressReporter,
    ) -> Result<Vec<(Preset, PathBuf)>, CriticalFailure> {
        let started = Instant::now();
        reporter.stage_started(&RENDER, "Rendering").await;

        let presets = if job.presets.is_empty() {
            self.settings.presets.clone()
        } else {
            job.presets.clone()
        };

        let mut rendered = Vec::new();
        let mut last_error = None;
        for (idx, preset) in presets.iter().enumerate() {
            let output = dirs.export.join(preset.render_filename());
            match self.backend.render(selection, &output, *preset).await {
                Ok(path) => rendered.push((*preset, path)),
                Err(e) => {
                    let err = StageError::from_media(&RENDER, &e);
                    reporter.warn(&RENDER, &err).await;
                    last_error = Some(err);
                }
            }
            let fraction = (idx + 1) as f64 / presets.len() as f64;
            reporter
                .report(&RENDER, fraction, &format!("Rendered {}", preset))
                .await;
        }

        if rendered.is_empty() {
            let error = last_error
                .unwrap_or_else(|| StageError::new(&RENDER, "No output formats were requested."));
            return Err(CriticalFailure::new(RENDER, error));
        }

        finish_stage(
            reporter,
            &RENDER,
            started,
            &format!("{} preset(s) rendered", rendered.len()),
        )
        .await;
        Ok(rendered)
    }

    async fn music(
        &self,
        selection: &Selection,
        rendered: &[(Preset, PathBuf)],
        dirs: &JobDirs,
        reporter: &ProgressReporter,
    ) -> Option<PathBuf> {
        let started = Instant::now();
        reporter.stage_started(&MUSIC, "Generating music").await;

        let duration = match rendered.first() {
            Some((_, path)) => match self.backend.duration(path).await {
                Ok(duration) => duration,
                Err(e) => {
                    debug!(error = %e, "Could not probe render, using selection length");
                    selection.total_duration()
                }
            },
            None => selection.total_duration(),
        };

        let output = dirs.root.join("music.m4a");
        let music = match self.backend.generate_music(duration, &output).await {
            Ok(path) => Some(path),
            Err(e) => {
                reporter.warn(&MUSIC, &StageError::from_media(&MUSIC, &e)).await;
                None
            }
        };

        let message = if music.is_some() {
            "Music ready"
        } else {
            "Continuing without music"
        };
        finish_stage(reporter, &MUSIC, started, message).await;
        music
    }

    async fn profanity(&self, selection: &Selection, reporter: &ProgressReporter) -> Vec<MuteSpan> {
        let started = Instant::now();
        reporter.stage_started(&PROFANITY, "Checking language").await;

        let spans = match self.backend.detect_profanity(selection).await {
            Ok(spans) => spans,
            Err(e) => {
                reporter
                    .warn(&PROFANITY, &StageError::from_media(&PROFANITY, &e))
                    .await;
                Vec::new()
            }
        };

        finish_stage(
            reporter,
            &PROFANITY,
            started,
            &format!("{} span(s) to mute", spans.len()),
        )
        .await;
        spans
    }

    async fn mix(
        &self,
        job: &HighlightJob,
        rendered: &[(Preset, PathBuf)],
        music: Option<&Path>,
        spans: &[MuteSpan],
        dirs: &JobDirs,
        reporter: &ProgressReporter,
    ) -> Vec<(Preset, PathBuf)> {
        let started = Instant::now();
        reporter.stage_started(&MIX, "Mixing audio").await;

        let watermark = job
            .watermark_text
            .as_deref()
            .or(self.settings.watermark_text.as_deref());

        let mut finals = Vec::with_capacity(rendered.len());
        for (idx, (preset, video)) in rendered.iter().enumerate() {
            let output = dirs.export.join(preset.final_filename());
            let result = self
                .backend
                .mix(video, music, spans, watermark, &output)
                .await;

            match result {
                Ok(path) => finals.push((*preset, path)),
                Err(e) => {
                    reporter.warn(&MIX, &StageError::from_media(&MIX, &e)).await;
                    finals.push((*preset, keep_unmixed(video, &output).await));
                }
            }
            let fraction = (idx + 1) as f64 / rendered.len() as f64;
            reporter
                .report(&MIX, fraction, &format!("Mixed {}", preset))
                .await;
        }

        finish_stage(reporter, &MIX, started, "Audio mixed").await;
        finals
    }

    async fn upload(
        &self,
        job_id: &JobId,
        finals: &[(Preset, PathBuf)],
        reporter: &ProgressReporter,
    ) -> BTreeMap<String, String> {
        let started = Instant::now();
        reporter.stage_started(&UPLOAD, "Storing outputs").await;

        let mut outputs = BTreeMap::new();
        for (preset, path) in finals {
            let local = path.display().to_string();
            let reference = match &self.blobs {
                Some(blobs) => {
                    let key = format!("{}/{}", job_id, preset.final_filename());
                    match blobs.save(path, &key).await {
                        Ok(reference) => reference,
                        Err(e) => {
                            let err =
                                StageError::new(&UPLOAD, "Upload failed; the local file was kept.")
                                    .with_diagnostics(format!("{} via {}: {}", key, blobs.name(), e))
                                    .retryable(true);
                            reporter.warn(&UPLOAD, &err).await;
                            local
                        }
                    }
                }
                None => local,
            };
            outputs.insert(preset.as_str().to_string(), reference);
        }

        finish_stage(reporter, &UPLOAD, started, "Outputs stored").await;
        outputs
    }
}

async fn finish_stage(
    reporter: &ProgressReporter,
    stage: &StageDescriptor,
    started: Instant,
    message: &str,
) {
    metrics::record_stage_duration(stage.name, started.elapsed().as_secs_f64());
    reporter.stage_finished(stage, message).await;
}

/// Put the pre-mix render at the final path; fall back to the render itself.
async fn keep_unmixed(rendered: &Path, final_path: &Path) -> PathBuf {
    match tokio::fs::copy(rendered, final_path).await {
        Ok(_) => final_path.to_path_buf(),
        Err(e) => {
            warn!(
                rendered = %rendered.display(),
                error = %e,
                "Could not copy unmixed render to final path"
            );
            rendered.to_path_buf()
        }
    }
}

/// Remove the job's scratch space, keeping `export/` when outputs point into it.
async fn cleanup_job_dir(dirs: &JobDirs, keep_export: bool) {
    if !keep_export {
        if let Err(e) = tokio::fs::remove_dir_all(&dirs.root).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %dirs.root.display(), error = %e, "Failed to remove job directory");
            }
        }
        return;
    }

    let mut entries = match tokio::fs::read_dir(&dirs.root).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dirs.root.display(), error = %e, "Failed to list job directory");
            return;
        }
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path == dirs.export {
            continue;
        }
        let removed = match entry.file_type().await {
            Ok(kind) if kind.is_dir() => tokio::fs::remove_dir_all(&path).await,
            _ => tokio::fs::remove_file(&path).await,
        };
        if let Err(e) = removed {
            warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
        }
    }
}
