//! Concat renderer with hardware-to-software encoder fallback.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use reelcut_models::{EncodingProfile, Preset, Selection};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::filters::preset_filter;
use crate::manifest::write_concat_manifest;
use crate::metrics::record_encoder_fallback;
use crate::tools::MediaTools;

/// Renders a selection into one file per preset.
#[derive(Debug, Clone)]
pub struct ConcatRenderer {
    tools: MediaTools,
    primary: EncodingProfile,
    fallback: EncodingProfile,
}

impl ConcatRenderer {
    /// Renderer trying NVENC first, then libx264.
    pub fn new(tools: MediaTools) -> Self {
        Self::with_profiles(tools, EncodingProfile::hardware(), EncodingProfile::software())
    }

    pub fn with_profiles(tools: MediaTools, primary: EncodingProfile, fallback: EncodingProfile) -> Self {
        Self {
            tools,
            primary,
            fallback,
        }
    }

    /// Render `selection` to `output_path` with the preset's scale/crop.
    ///
    /// The primary profile gets a single attempt; any failure, including an
    /// empty output file, switches to the fallback profile with the same
    /// filter graph.
    pub async fn render(
        &self,
        selection: &Selection,
        output_path: &Path,
        preset: Preset,
    ) -> MediaResult<PathBuf> {
        if selection.is_empty() {
            return Err(MediaError::EmptySelection);
        }

        let manifest = manifest_path(output_path, preset);
        write_concat_manifest(selection, &manifest).await?;

        let single_shot = self.tools.executor().policy().clone().with_max_retries(0);
        let primary_tools = self.tools.with_policy(single_shot);

        match self
            .encode(&primary_tools, &manifest, output_path, preset, &self.primary)
            .await
        {
            Ok(()) => {
                info!(preset = %preset, codec = %self.primary.codec, "Rendered highlight");
                return Ok(output_path.to_path_buf());
            }
            Err(e) => {
                warn!(
                    preset = %preset,
                    codec = %self.primary.codec,
                    fallback = %self.fallback.codec,
                    error = %e,
                    "Primary encoder failed, falling back"
                );
                record_encoder_fallback(preset.as_str());
                let _ = tokio::fs::remove_file(output_path).await;
            }
        }

        self.encode(&self.tools, &manifest, output_path, preset, &self.fallback)
            .await?;
        info!(preset = %preset, codec = %self.fallback.codec, "Rendered highlight with fallback encoder");
        Ok(output_path.to_path_buf())
    }

    async fn encode(
        &self,
        tools: &MediaTools,
        manifest: &Path,
        output_path: &Path,
        preset: Preset,
        profile: &EncodingProfile,
    ) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(output_path)
            .input_args(["-f", "concat", "-safe", "0"])
            .input(manifest)
            .video_filter(preset_filter(preset))
            .output_args(profile.to_ffmpeg_args())
            .output_args(["-movflags", "+faststart"]);

        tools.ffmpeg(cmd).await?;
        ensure_non_empty(output_path).await
    }
}

fn manifest_path(output_path: &Path, preset: Preset) -> PathBuf {
    output_path.with_file_name(format!("concat_{}.txt", preset.as_str()))
}

/// Fail unless `path` exists with at least one byte.
pub async fn ensure_non_empty(path: &Path) -> MediaResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(MediaError::EmptyArtifact(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ProcessExecutor, RetryPolicy};
    use crate::test_support::fake_tool;
    use reelcut_models::SelectionEntry;
    use std::time::Duration;
    use tempfile::TempDir;

    fn selection() -> Selection {
        Selection::new(vec![SelectionEntry {
            source_path: "/w/a.mp4".into(),
            start: 1.0,
            take_duration: 3.0,
        }])
    }

    fn tools_with(ffmpeg: &Path) -> MediaTools {
        let policy = RetryPolicy::default()
            .with_max_retries(2)
            .with_base_delay(Duration::from_millis(1));
        MediaTools::new(ffmpeg, "ffprobe", ProcessExecutor::new(policy))
    }

    #[tokio::test]
    async fn test_falls_back_to_software_encoder() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls.log");
        let ffmpeg = fake_tool(
            dir.path(),
            "ffmpeg",
            &format!(
                r#"echo "$*" >> '{log}'
case "$*" in *h264_nvenc*) echo "No NVENC capable devices found" >&2; exit 1;; esac
for a in "$@"; do last="$a"; done
printf 'video-bytes' > "$last""#,
                log = log.display()
            ),
        );

        let output = dir.path().join("video_portrait.mp4");
        let rendered = ConcatRenderer::new(tools_with(&ffmpeg))
            .render(&selection(), &output, Preset::Portrait)
            .await
            .unwrap();

        assert_eq!(rendered, output);
        assert!(std::fs::metadata(&output).unwrap().len() > 0);

        let calls = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("h264_nvenc"));
        assert!(lines[1].contains("libx264"));
        assert!(lines[1].contains("scale=-2:1920,crop=1080:1920"));

        let manifest = std::fs::read_to_string(dir.path().join("concat_portrait.txt")).unwrap();
        assert!(manifest.contains("inpoint 1.000"));
    }

    #[tokio::test]
    async fn test_empty_primary_output_triggers_fallback() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = fake_tool(
            dir.path(),
            "ffmpeg",
            r#"for a in "$@"; do last="$a"; done
case "$*" in *h264_nvenc*) : > "$last";; *) printf 'ok' > "$last";; esac"#,
        );

        let output = dir.path().join("video_landscape.mp4");
        ConcatRenderer::new(tools_with(&ffmpeg))
            .render(&selection(), &output, Preset::Landscape)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_both_encoders_failing_surfaces_error() {
        let dir = TempDir::new().unwrap();
        let ffmpeg = fake_tool(
            dir.path(),
            "ffmpeg",
            r#"echo "Invalid data found when processing input" >&2; exit 1"#,
        );

        let output = dir.path().join("video_square.mp4");
        let err = ConcatRenderer::new(tools_with(&ffmpeg))
            .render(&selection(), &output, Preset::Square)
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_empty_selection_is_rejected() {
        let renderer = ConcatRenderer::new(tools_with(Path::new("ffmpeg")));
        let err = renderer
            .render(&Selection::default(), Path::new("/tmp/x.mp4"), Preset::Landscape)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::EmptySelection));
    }
}
