//! FFmpeg-driven media pipeline for gameplay highlights.
//!
//! This crate provides:
//! - A hardened process executor (timeout, retry, stderr classification)
//! - Scene segmentation and per-segment signal scoring
//! - Fusion and duration-bounded greedy selection
//! - Concat rendering per output preset with encoder fallback
//! - Audio post-processing: profanity muting, music ducking, watermark

pub mod audio;
pub mod command;
pub mod error;
pub mod executor;
pub mod filters;
pub mod manifest;
pub mod metrics;
pub mod music;
pub mod normalize;
pub mod probe;
pub mod profanity;
pub mod render;
pub mod segmenter;
pub mod selection;
pub mod signals;
pub mod tools;
pub mod watermark;

pub use audio::{AudioMixer, DuckingMode, MixOptions, MuteSpan, DEFAULT_MUSIC_GAIN};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, ToolCommand};
pub use error::{FailureKind, MediaError, MediaResult, ToolFailure};
pub use executor::{ProcessExecutor, RetryPolicy, ToolOutput};
pub use manifest::{build_concat_manifest, write_concat_manifest};
pub use music::{MusicGenerator, ProceduralMusicGenerator};
pub use normalize::normalize_video;
pub use probe::{get_duration, probe_video, VideoInfo};
pub use profanity::{
    transcript_path, NoProfanityDetector, ProfanityDetector, TranscriptProfanityDetector,
};
pub use render::ConcatRenderer;
pub use segmenter::detect_segments;
pub use selection::{fuse, rank, select, DEFAULT_MAX_TAKE_SECS};
pub use signals::{EventDetector, SignalScorer};
pub use tools::MediaTools;
pub use watermark::WatermarkStyle;

#[cfg(test)]
pub(crate) mod test_support {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable shell script standing in for a real tool.
    pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
