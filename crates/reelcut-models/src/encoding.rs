//! Video encoding profiles.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Hardware encoder tried first by the renderer
pub const HARDWARE_VIDEO_CODEC: &str = "h264_nvenc";
/// Software encoder used when the hardware encoder fails
pub const SOFTWARE_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Default quality (CRF for x264, CQ for NVENC)
pub const DEFAULT_QUALITY: u8 = 20;

/// Encoder settings for one render attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingProfile {
    /// Video codec (e.g., "libx264", "h264_nvenc")
    pub codec: String,

    /// Encoder speed preset (e.g., "fast", "p4")
    pub preset: String,

    /// Quality target, lower is better
    pub quality: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Whether the codec needs a GPU
    #[serde(default)]
    pub hardware: bool,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl EncodingProfile {
    /// NVENC profile.
    pub fn hardware() -> Self {
        Self {
            codec: HARDWARE_VIDEO_CODEC.to_string(),
            preset: "p4".to_string(),
            quality: DEFAULT_QUALITY + 3,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            hardware: true,
            extra_args: Vec::new(),
        }
    }

    /// libx264 profile.
    pub fn software() -> Self {
        Self {
            codec: SOFTWARE_VIDEO_CODEC.to_string(),
            preset: "fast".to_string(),
            quality: DEFAULT_QUALITY,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            hardware: false,
            extra_args: Vec::new(),
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
        ];

        // NVENC takes -cq, x264 takes -crf
        let quality_flag = if self.hardware { "-cq" } else { "-crf" };
        args.extend_from_slice(&[quality_flag.to_string(), self.quality.to_string()]);

        args.extend_from_slice(&[
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]);

        args.extend(self.extra_args.iter().cloned());
        args
    }
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self::software()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_args_use_crf() {
        let args = EncodingProfile::software().to_ffmpeg_args();
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-crf".to_string()));
        assert!(!args.contains(&"-cq".to_string()));
    }

    #[test]
    fn test_hardware_args_use_cq() {
        let args = EncodingProfile::hardware().to_ffmpeg_args();
        assert!(args.contains(&"h264_nvenc".to_string()));
        assert!(args.contains(&"-cq".to_string()));
    }
}
