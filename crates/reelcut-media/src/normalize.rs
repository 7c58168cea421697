//! Upload normalization.
//!
//! Concat demuxing needs every input to share resolution, frame rate and
//! stream layout, so each upload is re-encoded to 1920x1080@30 H.264 with a
//! stereo AAC track (silence is synthesized for uploads without audio).

use std::path::{Path, PathBuf};
use tracing::info;

use reelcut_models::EncodingProfile;

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::filters::{silent_audio_source, FILTER_NORMALIZE};
use crate::probe::{probe_video, VideoInfo};
use crate::render::ensure_non_empty;
use crate::tools::MediaTools;

/// Build the normalization command for a probed input.
pub fn normalize_command(input: &Path, output: &Path, info: &VideoInfo) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(output).input(input);
    if info.has_audio {
        cmd = cmd.map("0:v:0").map("0:a:0");
    } else {
        cmd = cmd
            .input_args(["-f", "lavfi"])
            .input_source(silent_audio_source())
            .map("0:v:0")
            .map("1:a:0")
            .output_arg("-shortest");
    }

    let profile = EncodingProfile {
        preset: "veryfast".to_string(),
        ..EncodingProfile::software()
    };

    cmd.video_filter(FILTER_NORMALIZE)
        .output_args(profile.to_ffmpeg_args())
        .output_args(["-ar", "44100", "-ac", "2"])
}

/// Normalize one upload, returning the probed info of the source.
pub async fn normalize_video(
    tools: &MediaTools,
    input: &Path,
    output: &Path,
) -> MediaResult<(PathBuf, VideoInfo)> {
    let info = probe_video(tools, input).await?;

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tools.ffmpeg(normalize_command(input, output, &info)).await?;
    ensure_non_empty(output).await?;

    info!(
        input = %input.display(),
        output = %output.display(),
        duration = info.duration,
        synthesized_audio = !info.has_audio,
        "Normalized upload"
    );
    Ok((output.to_path_buf(), info))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(has_audio: bool) -> VideoInfo {
        VideoInfo {
            duration: 60.0,
            width: 1280,
            height: 720,
            fps: 60.0,
            codec: "h264".to_string(),
            has_audio,
        }
    }

    #[test]
    fn test_silent_upload_gets_synthetic_audio() {
        let args = normalize_command(Path::new("in.mp4"), Path::new("out.mp4"), &info(false))
            .build_args()
            .join(" ");
        assert!(args.contains("-f lavfi -i anullsrc"));
        assert!(args.contains("-map 1:a:0"));
        assert!(args.contains("-shortest"));
    }

    #[test]
    fn test_upload_with_audio_keeps_track() {
        let args = normalize_command(Path::new("in.mp4"), Path::new("out.mp4"), &info(true))
            .build_args()
            .join(" ");
        assert!(args.contains("-map 0:a:0"));
        assert!(!args.contains("anullsrc"));
        assert!(args.contains("-preset veryfast"));
    }
}
