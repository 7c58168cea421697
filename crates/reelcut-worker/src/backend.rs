//! Media operations used by the pipeline.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use reelcut_media::{
    detect_segments, get_duration, normalize_video, transcript_path, AudioMixer, ConcatRenderer,
    MediaResult, MediaTools, MusicGenerator, MuteSpan, ProfanityDetector, SignalScorer,
};
use reelcut_models::{Preset, ScoredSegment, Segment, Selection};

/// A normalized upload ready for segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSource {
    pub path: PathBuf,
    pub duration: f64,
}

#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Normalize one upload to `output`.
    async fn preprocess(&self, input: &Path, output: &Path) -> MediaResult<PreparedSource>;

    async fn detect_segments(&self, source: &Path) -> MediaResult<Vec<Segment>>;

    /// Score segments of one source, keeping their order.
    async fn score_segments(&self, source: &Path, segments: &[Segment]) -> Vec<ScoredSegment>;

    async fn render(
        &self,
        selection: &Selection,
        output: &Path,
        preset: Preset,
    ) -> MediaResult<PathBuf>;

    async fn generate_music(&self, duration: f64, output: &Path) -> MediaResult<PathBuf>;

    async fn detect_profanity(&self, selection: &Selection) -> MediaResult<Vec<MuteSpan>>;

    async fn mix(
        &self,
        rendered: &Path,
        music: Option<&Path>,
        spans: &[MuteSpan],
        watermark_text: Option<&str>,
        output: &Path,
    ) -> MediaResult<PathBuf>;

    async fn duration(&self, path: &Path) -> MediaResult<f64>;
}

/// Backend driving ffmpeg/ffprobe.
pub struct FfmpegBackend {
    tools: MediaTools,
    scorer: SignalScorer,
    renderer: ConcatRenderer,
    music: Arc<dyn MusicGenerator>,
    profanity: Arc<dyn ProfanityDetector>,
    mixer: AudioMixer,
}

impl FfmpegBackend {
    pub fn new(
        tools: MediaTools,
        scorer: SignalScorer,
        music: Arc<dyn MusicGenerator>,
        profanity: Arc<dyn ProfanityDetector>,
        mixer: AudioMixer,
    ) -> Self {
        Self {
            renderer: ConcatRenderer::new(tools.clone()),
            tools,
            scorer,
            music,
            profanity,
            mixer,
        }
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn preprocess(&self, input: &Path, output: &Path) -> MediaResult<PreparedSource> {
        let (path, info) = normalize_video(&self.tools, input, output).await?;

        // Transcript sidecars follow the normalized copy so profanity lookup finds them.
        // A failed copy only disables muting for this input.
        let sidecar = transcript_path(input);
        if tokio::fs::try_exists(&sidecar).await.unwrap_or(false) {
            match tokio::fs::copy(&sidecar, transcript_path(&path)).await {
                Ok(_) => debug!(sidecar = %sidecar.display(), "Copied transcript sidecar"),
                Err(e) => warn!(
                    sidecar = %sidecar.display(),
                    error = %e,
                    "Could not copy transcript sidecar; profanity muting skipped for this upload"
                ),
            }
        }

        Ok(PreparedSource {
            path,
            duration: info.duration,
        })
    }

    async fn detect_segments(&self, source: &Path) -> MediaResult<Vec<Segment>> {
        detect_segments(&self.tools, source).await
    }

    async fn score_segments(&self, source: &Path, segments: &[Segment]) -> Vec<ScoredSegment> {
        self.scorer.score_source(source, segments).await
    }

    async fn render(
        &self,
        selection: &Selection,
        output: &Path,
        preset: Preset,
    ) -> MediaResult<PathBuf> {
        self.renderer.render(selection, output, preset).await
    }

    async fn generate_music(&self, duration: f64, output: &Path) -> MediaResult<PathBuf> {
        self.music.generate(duration, output).await
    }

    async fn detect_profanity(&self, selection: &Selection) -> MediaResult<Vec<MuteSpan>> {
        self.profanity.detect(selection).await
    }

    async fn mix(
        &self,
        rendered: &Path,
        music: Option<&Path>,
        spans: &[MuteSpan],
        watermark_text: Option<&str>,
        output: &Path,
    ) -> MediaResult<PathBuf> {
        self.mixer
            .mix(rendered, music, spans, watermark_text, output)
            .await
    }

    async fn duration(&self, path: &Path) -> MediaResult<f64> {
        get_duration(&self.tools, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcut_media::{
        MixOptions, NoProfanityDetector, ProceduralMusicGenerator, ProcessExecutor, RetryPolicy,
    };
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const PROBE_JSON: &str = r#"{"format": {"duration": "42.0"}, "streams": [
{"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720, "avg_frame_rate": "30/1"},
{"codec_type": "audio", "codec_name": "aac"}]}"#;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn backend(dir: &Path) -> FfmpegBackend {
        let ffprobe = script(dir, "ffprobe", &format!("cat <<'JSON'\n{}\nJSON", PROBE_JSON));
        let ffmpeg = script(
            dir,
            "ffmpeg",
            r#"for a in "$@"; do last="$a"; done
printf 'mp4' > "$last""#,
        );
        let tools = MediaTools::new(
            &ffmpeg,
            &ffprobe,
            ProcessExecutor::new(RetryPolicy::default().with_max_retries(0)),
        );
        FfmpegBackend::new(
            tools.clone(),
            SignalScorer::new(tools.clone()),
            Arc::new(ProceduralMusicGenerator::new(tools.clone())),
            Arc::new(NoProfanityDetector),
            AudioMixer::new(tools, MixOptions::default()),
        )
    }

    #[tokio::test]
    async fn test_preprocess_copies_transcript_sidecar() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, "raw").unwrap();
        std::fs::write(transcript_path(&input), r#"{"words": []}"#).unwrap();

        let output = dir.path().join("input").join("00_clip.mp4");
        let source = backend(dir.path()).preprocess(&input, &output).await.unwrap();

        assert_eq!(source.path, output);
        assert!((source.duration - 42.0).abs() < 1e-9);
        assert!(transcript_path(&output).is_file());
    }

    #[tokio::test]
    async fn test_unreadable_sidecar_does_not_fail_preprocess() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, "raw").unwrap();
        std::fs::create_dir(transcript_path(&input)).unwrap();

        let output = dir.path().join("input").join("00_clip.mp4");
        let source = backend(dir.path()).preprocess(&input, &output).await.unwrap();

        assert_eq!(source.path, output);
        assert!(output.is_file());
        assert!(!transcript_path(&output).exists());
    }
}
