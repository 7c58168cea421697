//! FFmpeg filter definitions.

use reelcut_models::Preset;

/// Landscape: scale to 1920 wide, keep aspect.
pub const FILTER_LANDSCAPE: &str = "scale=1920:-2";

/// Portrait: scale to 1920 high, center-crop to 1080x1920.
pub const FILTER_PORTRAIT: &str = "scale=-2:1920,crop=1080:1920";

/// Square: cover 1080x1080, center-crop.
pub const FILTER_SQUARE: &str =
    "scale=1080:1080:force_original_aspect_ratio=increase,crop=1080:1080";

/// Normalization applied to every upload so concat inputs share one format.
pub const FILTER_NORMALIZE: &str = concat!(
    "scale=1920:1080:force_original_aspect_ratio=decrease,",
    "pad=1920:1080:(ow-iw)/2:(oh-ih)/2,",
    "setsar=1,",
    "fps=30"
);

/// Build video filter for a preset.
pub fn preset_filter(preset: Preset) -> &'static str {
    match preset {
        Preset::Landscape => FILTER_LANDSCAPE,
        Preset::Portrait => FILTER_PORTRAIT,
        Preset::Square => FILTER_SQUARE,
    }
}

/// Silent stereo source used when an upload has no audio track.
pub fn silent_audio_source() -> &'static str {
    "anullsrc=channel_layout=stereo:sample_rate=44100"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_filters() {
        assert_eq!(preset_filter(Preset::Landscape), "scale=1920:-2");
        assert!(preset_filter(Preset::Portrait).ends_with("crop=1080:1920"));
        assert!(preset_filter(Preset::Square).contains("force_original_aspect_ratio=increase"));
    }
}
