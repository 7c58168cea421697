//! Output preset definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output aspect-ratio/crop configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// 16:9, scaled to 1920 wide
    Landscape,
    /// 9:16, center-cropped to 1080x1920
    Portrait,
    /// 1:1, center-cropped to 1080x1080
    Square,
}

impl Preset {
    /// All presets.
    pub const ALL: &'static [Preset] = &[Preset::Landscape, Preset::Portrait, Preset::Square];

    /// Presets rendered when a job does not ask for specific ones.
    pub const DEFAULT: &'static [Preset] = &[Preset::Landscape, Preset::Portrait];

    /// Name used in artifact filenames.
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Landscape => "landscape",
            Preset::Portrait => "portrait",
            Preset::Square => "square",
        }
    }

    /// Pre-mix render filename (`video_<preset>.mp4`).
    pub fn render_filename(&self) -> String {
        format!("video_{}.mp4", self.as_str())
    }

    /// Post-mix filename (`final_<preset>.mp4`).
    pub fn final_filename(&self) -> String {
        format!("final_{}.mp4", self.as_str())
    }

    /// Parse a comma-separated preset list, dropping unknown names and duplicates.
    pub fn parse_list(s: &str) -> Vec<Preset> {
        let mut presets = Vec::new();
        for part in s.split(',') {
            if let Ok(preset) = part.trim().parse::<Preset>() {
                if !presets.contains(&preset) {
                    presets.push(preset);
                }
            }
        }
        presets
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Preset {
    type Err = PresetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "landscape" => Ok(Preset::Landscape),
            "portrait" => Ok(Preset::Portrait),
            "square" => Ok(Preset::Square),
            _ => Err(PresetParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown preset: {0}")]
pub struct PresetParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        assert_eq!(Preset::Landscape.render_filename(), "video_landscape.mp4");
        assert_eq!(Preset::Portrait.final_filename(), "final_portrait.mp4");
    }

    #[test]
    fn test_parse_list() {
        let presets = Preset::parse_list("landscape, PORTRAIT,bogus,landscape");
        assert_eq!(presets, vec![Preset::Landscape, Preset::Portrait]);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Preset::Square).unwrap();
        assert_eq!(json, "\"square\"");
    }
}
