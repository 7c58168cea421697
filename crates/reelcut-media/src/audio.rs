//! Audio post-processing: profanity muting, music bed ducking and watermark.
//!
//! One filter graph per output handles everything. Input 0 is the rendered
//! highlight, input 1 (optional) the looping music bed.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use reelcut_models::EncodingProfile;

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::render::ensure_non_empty;
use crate::tools::MediaTools;
use crate::watermark::{drawtext_filter, WatermarkStyle};

/// Music level relative to dialogue.
pub const DEFAULT_MUSIC_GAIN: f64 = 0.2;

/// A window of the rendered timeline to silence, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MuteSpan {
    pub start: f64,
    pub end: f64,
}

impl MuteSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// How the music bed is lowered under dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuckingMode {
    /// Fixed gain for the whole bed
    #[default]
    Static,
    /// Compress the bed whenever dialogue is present
    Sidechain,
}

impl FromStr for DuckingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "static" => Ok(DuckingMode::Static),
            "sidechain" => Ok(DuckingMode::Sidechain),
            other => Err(format!("Unknown ducking mode: {}", other)),
        }
    }
}

/// Mixer settings.
#[derive(Debug, Clone)]
pub struct MixOptions {
    pub music_gain: f64,
    pub ducking: DuckingMode,
    pub watermark: WatermarkStyle,
    /// Profile used when the watermark forces a video re-encode
    pub video_profile: EncodingProfile,
}

impl Default for MixOptions {
    fn default() -> Self {
        Self {
            music_gain: DEFAULT_MUSIC_GAIN,
            ducking: DuckingMode::Static,
            watermark: WatermarkStyle::default(),
            video_profile: EncodingProfile::software(),
        }
    }
}

/// Filter graph plus the stream labels to map.
#[derive(Debug, Clone, PartialEq)]
pub struct MixGraph {
    pub filter_complex: String,
    pub video_map: String,
    pub audio_map: String,
    /// True when the video stream is stream-copied
    pub copy_video: bool,
}

/// Chain of zero-volume windows; `anull` when there is nothing to mute.
pub fn mute_filter(spans: &[MuteSpan]) -> String {
    let windows: Vec<String> = spans
        .iter()
        .filter(|s| s.end > s.start)
        .map(|s| format!("volume=0:enable='between(t,{:.3},{:.3})'", s.start, s.end))
        .collect();
    if windows.is_empty() {
        "anull".to_string()
    } else {
        windows.join(",")
    }
}

/// Build the complete mix graph.
pub fn build_mix_graph(
    spans: &[MuteSpan],
    has_music: bool,
    watermark_text: Option<&str>,
    options: &MixOptions,
) -> MixGraph {
    let mut chains = Vec::new();

    if has_music {
        chains.push(format!("[0:a]{}[clean]", mute_filter(spans)));
        chains.push(format!("[1:a]volume={:.3}[music]", options.music_gain));
        match options.ducking {
            DuckingMode::Static => chains.push(
                "[clean][music]amix=inputs=2:duration=first:dropout_transition=0[aout]".to_string(),
            ),
            DuckingMode::Sidechain => {
                chains.push("[clean]asplit=2[dialogue][key]".to_string());
                chains.push(
                    "[music][key]sidechaincompress=threshold=0.03:ratio=8:attack=20:release=250[ducked]"
                        .to_string(),
                );
                chains.push(
                    "[dialogue][ducked]amix=inputs=2:duration=first:dropout_transition=0[aout]"
                        .to_string(),
                );
            }
        }
    } else {
        chains.push(format!("[0:a]{}[aout]", mute_filter(spans)));
    }

    let watermark = watermark_text.map(str::trim).filter(|t| !t.is_empty());
    let (video_map, copy_video) = match watermark {
        Some(text) => {
            chains.push(format!(
                "[0:v]{}[vout]",
                drawtext_filter(text, &options.watermark)
            ));
            ("[vout]".to_string(), false)
        }
        None => ("0:v:0".to_string(), true),
    };

    MixGraph {
        filter_complex: chains.join(";"),
        video_map,
        audio_map: "[aout]".to_string(),
        copy_video,
    }
}

/// Applies the mix graph to rendered highlights.
#[derive(Debug, Clone)]
pub struct AudioMixer {
    tools: MediaTools,
    options: MixOptions,
}

impl AudioMixer {
    pub fn new(tools: MediaTools, options: MixOptions) -> Self {
        Self { tools, options }
    }

    pub fn options(&self) -> &MixOptions {
        &self.options
    }

    /// Produce the final deliverable for one rendered preset.
    pub async fn mix(
        &self,
        rendered_video: &Path,
        music_bed: Option<&Path>,
        spans: &[MuteSpan],
        watermark_text: Option<&str>,
        output_path: &Path,
    ) -> MediaResult<PathBuf> {
        let graph = build_mix_graph(spans, music_bed.is_some(), watermark_text, &self.options);

        let mut cmd = FfmpegCommand::new(output_path).input(rendered_video);
        if let Some(music) = music_bed {
            cmd = cmd.input_args(["-stream_loop", "-1"]).input(music);
        }
        cmd = cmd
            .filter_complex(&graph.filter_complex)
            .map(&graph.video_map)
            .map(&graph.audio_map);

        cmd = if graph.copy_video {
            let profile = &self.options.video_profile;
            cmd.output_args(["-c:v", "copy", "-c:a"])
                .output_arg(&profile.audio_codec)
                .output_arg("-b:a")
                .output_arg(&profile.audio_bitrate)
        } else {
            cmd.output_args(self.options.video_profile.to_ffmpeg_args())
        };
        cmd = cmd.output_args(["-shortest", "-movflags", "+faststart"]);

        self.tools.ffmpeg(cmd).await?;
        ensure_non_empty(output_path).await?;

        info!(
            output = %output_path.display(),
            muted_spans = spans.len(),
            music = music_bed.is_some(),
            watermark = !graph.copy_video,
            "Mixed final audio"
        );
        Ok(output_path.to_path_buf())
    }
}
