//! Segment and signal definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Shortest segment the segmenter will emit, in seconds.
pub const MIN_SEGMENT_SECS: f64 = 0.1;

/// A contiguous time window within one source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// Source video the window belongs to
    pub source_path: PathBuf,
    /// Window start in seconds
    pub start_seconds: f64,
    /// Window end in seconds
    pub end_seconds: f64,
}

impl Segment {
    /// Create a new segment.
    pub fn new(source_path: impl AsRef<Path>, start_seconds: f64, end_seconds: f64) -> Self {
        Self {
            source_path: source_path.as_ref().to_path_buf(),
            start_seconds,
            end_seconds,
        }
    }

    /// Duration of the window in seconds.
    pub fn duration(&self) -> f64 {
        (self.end_seconds - self.start_seconds).max(0.0)
    }

    /// Midpoint of the window in seconds.
    pub fn midpoint(&self) -> f64 {
        self.start_seconds + self.duration() / 2.0
    }

    /// Clip the end of the window to a known media duration.
    ///
    /// Returns `None` when nothing usable is left.
    pub fn clipped_to(&self, media_duration: f64) -> Option<Segment> {
        let end = self.end_seconds.min(media_duration);
        if end - self.start_seconds < MIN_SEGMENT_SECS {
            return None;
        }
        Some(Segment {
            source_path: self.source_path.clone(),
            start_seconds: self.start_seconds,
            end_seconds: end,
        })
    }
}

/// Raw per-segment signals, nominally on a 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SignalBundle {
    /// Median frame-to-frame pixel difference
    pub motion: f64,
    /// Loudness score derived from mean/peak volume
    pub audio_energy: f64,
    /// Steadiness of motion over the window
    pub temporal_consistency: f64,
    /// Bonus from the external event detector (0 when disabled)
    pub event_bonus: f64,
}

/// A segment with its signals and fused ranking score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoredSegment {
    pub segment: Segment,
    pub signals: SignalBundle,
    pub fused_score: f64,
}

impl ScoredSegment {
    pub fn new(segment: Segment, signals: SignalBundle, fused_score: f64) -> Self {
        Self {
            segment,
            signals,
            fused_score,
        }
    }

    /// Duration of the underlying segment.
    pub fn duration(&self) -> f64 {
        self.segment.duration()
    }
}

/// An event reported by the external event detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectedEvent {
    /// Event time in seconds from the start of the source
    pub time: f64,
    /// Detector confidence (0.0-1.0)
    pub confidence: f64,
    /// Event label, e.g. "kill" or "goal"
    #[serde(rename = "type")]
    pub event_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_duration_and_midpoint() {
        let seg = Segment::new("/videos/a.mp4", 10.0, 14.0);
        assert!((seg.duration() - 4.0).abs() < 1e-9);
        assert!((seg.midpoint() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_clip_fallback_segment_to_media_duration() {
        let seg = Segment::new("/videos/a.mp4", 0.0, 30.0);
        let clipped = seg.clipped_to(12.5).unwrap();
        assert!((clipped.end_seconds - 12.5).abs() < 1e-9);

        assert!(seg.clipped_to(0.05).is_none());
    }

    #[test]
    fn test_event_type_field_name() {
        let json = r#"{"time": 3.5, "confidence": 0.9, "type": "kill"}"#;
        let event: DetectedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, "kill");
    }
}
