//! Per-segment engagement signals.
//!
//! Motion and temporal consistency are derived from small grayscale frames
//! piped out of ffmpeg as rawvideo; audio energy comes from `volumedetect`.
//! Signal functions degrade to fixed fallback scores instead of failing so a
//! single unreadable window never sinks a whole source.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use reelcut_models::{DetectedEvent, ScoredSegment, Segment, SignalBundle};

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::selection::fuse;
use crate::tools::MediaTools;

/// Sampling rate for motion analysis.
pub const SAMPLE_FPS: f64 = 6.0;
/// Audio score used when loudness cannot be measured.
pub const AUDIO_FALLBACK_SCORE: f64 = 30.0;
/// Temporal score used when there are too few samples.
pub const TEMPORAL_FALLBACK_SCORE: f64 = 50.0;
/// Events within this many seconds of a segment midpoint count toward its bonus.
pub const EVENT_WINDOW_SECS: f64 = 3.0;
/// Bonus awarded for a fully confident event.
pub const EVENT_WEIGHT: f64 = 40.0;

const THUMB_WIDTH: usize = 64;
const THUMB_HEIGHT: usize = 36;
const FRAME_BYTES: usize = THUMB_WIDTH * THUMB_HEIGHT;

/// External oracle reporting notable gameplay moments.
#[async_trait]
pub trait EventDetector: Send + Sync {
    /// Detect events over a whole source file.
    async fn detect_events(&self, video_path: &Path) -> MediaResult<Vec<DetectedEvent>>;
}

/// Decode a window as tiny grayscale frames at [`SAMPLE_FPS`].
pub async fn sample_gray_frames(
    tools: &MediaTools,
    video_path: &Path,
    start: f64,
    duration: f64,
) -> MediaResult<Vec<Vec<u8>>> {
    let cmd = FfmpegCommand::to_sink("pipe:1")
        .seek(start)
        .duration(duration)
        .input(video_path)
        .video_filter(format!(
            "fps={},scale={}:{},format=gray",
            SAMPLE_FPS, THUMB_WIDTH, THUMB_HEIGHT
        ))
        .output_args(["-an", "-pix_fmt", "gray"])
        .format("rawvideo");

    let output = tools.ffmpeg(cmd).await?;
    let frames: Vec<Vec<u8>> = output
        .stdout
        .chunks_exact(FRAME_BYTES)
        .map(|c| c.to_vec())
        .collect();

    debug!(
        path = %video_path.display(),
        start,
        frames = frames.len(),
        "Sampled frames"
    );
    Ok(frames)
}

/// Mean absolute pixel difference for each consecutive frame pair.
pub fn frame_differences(frames: &[Vec<u8>]) -> Vec<f64> {
    frames
        .windows(2)
        .filter(|pair| pair[0].len() == pair[1].len() && !pair[0].is_empty())
        .map(|pair| {
            let total: u64 = pair[0]
                .iter()
                .zip(pair[1].iter())
                .map(|(a, b)| a.abs_diff(*b) as u64)
                .sum();
            total as f64 / pair[0].len() as f64
        })
        .collect()
}

/// Median frame-pair difference; 0.0 with fewer than two frames.
pub fn motion_from_frames(frames: &[Vec<u8>]) -> f64 {
    median(&frame_differences(frames)).unwrap_or(0.0)
}

/// Steadiness of motion across at least three sub-windows (two per second).
///
/// Returns `None` when there are not enough samples to fill three windows.
pub fn temporal_from_frames(frames: &[Vec<u8>], duration: f64) -> Option<f64> {
    let diffs = frame_differences(frames);
    let windows = ((duration * 2.0).ceil() as usize).max(3);
    if diffs.len() < 3 {
        return None;
    }

    let mut sums = vec![0.0; windows];
    let mut counts = vec![0usize; windows];
    for (i, d) in diffs.iter().enumerate() {
        let w = (i * windows / diffs.len()).min(windows - 1);
        sums[w] += d;
        counts[w] += 1;
    }
    let per_window: Vec<f64> = sums
        .iter()
        .zip(counts.iter())
        .filter(|(_, c)| **c > 0)
        .map(|(s, c)| s / *c as f64)
        .collect();
    if per_window.len() < 3 {
        return None;
    }

    let mean = per_window.iter().sum::<f64>() / per_window.len() as f64;
    let variance =
        per_window.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / per_window.len() as f64;
    let cv = if mean > 0.0 { variance.sqrt() / mean } else { 0.0 };

    let steadiness = 100.0 / (1.0 + cv);
    let intensity = (2.0 * mean).min(100.0);
    Some(0.5 * steadiness + 0.5 * intensity)
}

/// Motion score for one window.
pub async fn motion_score(
    tools: &MediaTools,
    video_path: &Path,
    start: f64,
    duration: f64,
) -> MediaResult<f64> {
    let frames = sample_gray_frames(tools, video_path, start, duration).await?;
    Ok(motion_from_frames(&frames))
}

/// Temporal consistency for one window; never fails.
pub async fn temporal_consistency(
    tools: &MediaTools,
    video_path: &Path,
    start: f64,
    duration: f64,
) -> f64 {
    match sample_gray_frames(tools, video_path, start, duration).await {
        Ok(frames) => temporal_from_frames(&frames, duration).unwrap_or(TEMPORAL_FALLBACK_SCORE),
        Err(e) => {
            debug!(error = %e, "Temporal sampling failed");
            TEMPORAL_FALLBACK_SCORE
        }
    }
}

/// Loudness score for one window; never fails.
pub async fn audio_energy(tools: &MediaTools, video_path: &Path, start: f64, duration: f64) -> f64 {
    let cmd = FfmpegCommand::to_sink("-")
        .log_level("info")
        .seek(start)
        .duration(duration)
        .input(video_path)
        .output_arg("-vn")
        .audio_filter("volumedetect")
        .format("null");

    match tools.ffmpeg(cmd).await {
        Ok(output) => match parse_volumedetect(&output.stderr) {
            Some((mean, peak)) => audio_energy_from_levels(mean, peak),
            None => AUDIO_FALLBACK_SCORE,
        },
        Err(e) => {
            debug!(error = %e, "volumedetect failed");
            AUDIO_FALLBACK_SCORE
        }
    }
}

/// Extract `(mean_volume, max_volume)` in dB from volumedetect output.
pub fn parse_volumedetect(stderr: &str) -> Option<(f64, f64)> {
    let read = |key: &str| {
        stderr.lines().find_map(|line| {
            let rest = line.split(key).nth(1)?;
            rest.split_whitespace().next()?.parse::<f64>().ok()
        })
    };
    Some((read("mean_volume:")?, read("max_volume:")?))
}

/// Map volumedetect levels onto the score scale.
pub fn audio_energy_from_levels(mean_db: f64, peak_db: f64) -> f64 {
    // ffmpeg's digital floor
    let floor = -91.0;
    let mean = if mean_db.is_finite() { mean_db } else { floor };
    let peak = if peak_db.is_finite() { peak_db } else { floor };

    let base = ((mean + 30.0) / 30.0 * 100.0).clamp(0.0, 100.0);
    let dynamic_bonus = (0.5 * (peak - mean)).clamp(0.0, 15.0);
    base + dynamic_bonus
}

/// Best confidence-weighted event near the midpoint.
pub fn event_bonus(events: &[DetectedEvent], midpoint: f64) -> f64 {
    events
        .iter()
        .filter(|e| (e.time - midpoint).abs() <= EVENT_WINDOW_SECS)
        .map(|e| e.confidence.clamp(0.0, 1.0) * EVENT_WEIGHT)
        .fold(0.0, f64::max)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Computes signal bundles and fused scores for a source's segments.
#[derive(Clone)]
pub struct SignalScorer {
    tools: MediaTools,
    detector: Option<Arc<dyn EventDetector>>,
}

impl SignalScorer {
    pub fn new(tools: MediaTools) -> Self {
        Self {
            tools,
            detector: None,
        }
    }

    pub fn with_event_detector(mut self, detector: Arc<dyn EventDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Score every segment of one source, keeping detection order.
    pub async fn score_source(&self, video_path: &Path, segments: &[Segment]) -> Vec<ScoredSegment> {
        let events = self.events_for(video_path).await;

        let mut scored = Vec::with_capacity(segments.len());
        for segment in segments {
            let signals = self.score_segment(segment, &events).await;
            let fused = fuse(&signals);
            scored.push(ScoredSegment::new(segment.clone(), signals, fused));
        }
        scored
    }

    /// Compute the signal bundle for one segment.
    pub async fn score_segment(&self, segment: &Segment, events: &[DetectedEvent]) -> SignalBundle {
        let path = &segment.source_path;
        let start = segment.start_seconds;
        let duration = segment.duration();

        let (motion, temporal_consistency) =
            match sample_gray_frames(&self.tools, path, start, duration).await {
                Ok(frames) => (
                    motion_from_frames(&frames),
                    temporal_from_frames(&frames, duration).unwrap_or(TEMPORAL_FALLBACK_SCORE),
                ),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        start,
                        error = %e,
                        "Frame sampling failed, using neutral motion"
                    );
                    (0.0, TEMPORAL_FALLBACK_SCORE)
                }
            };

        SignalBundle {
            motion,
            audio_energy: audio_energy(&self.tools, path, start, duration).await,
            temporal_consistency,
            event_bonus: event_bonus(events, segment.midpoint()),
        }
    }

    async fn events_for(&self, video_path: &Path) -> Vec<DetectedEvent> {
        let Some(detector) = &self.detector else {
            return Vec::new();
        };
        match detector.detect_events(video_path).await {
            Ok(events) => {
                debug!(path = %video_path.display(), events = events.len(), "Event detector responded");
                events
            }
            Err(e) => {
                warn!(path = %video_path.display(), error = %e, "Event detector failed, no bonus applied");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: u8) -> Vec<u8> {
        vec![value; 16]
    }

    fn event(time: f64, confidence: f64) -> DetectedEvent {
        DetectedEvent {
            time,
            confidence,
            event_type: "kill".to_string(),
        }
    }

    #[test]
    fn test_motion_needs_two_frames() {
        assert_eq!(motion_from_frames(&[]), 0.0);
        assert_eq!(motion_from_frames(&[frame(10)]), 0.0);
    }

    #[test]
    fn test_motion_is_median_of_pair_differences() {
        // diffs: 10, 10, 100
        let frames = vec![frame(0), frame(10), frame(20), frame(120)];
        assert!((motion_from_frames(&frames) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_temporal_steady_motion_scores_high() {
        // constant diff of 20 across 12 pairs
        let frames: Vec<Vec<u8>> = (0..13).map(|i| frame(if i % 2 == 0 { 0 } else { 20 })).collect();
        let diffs = frame_differences(&frames);
        assert!(diffs.iter().all(|d| (*d - 20.0).abs() < 1e-9));

        let steady = temporal_from_frames(&frames, 2.0).unwrap();
        assert!((steady - 70.0).abs() < 1e-9);

        let jumpy: Vec<Vec<u8>> = vec![
            frame(0), frame(0), frame(0), frame(0), frame(60), frame(0), frame(0),
        ];
        let erratic = temporal_from_frames(&jumpy, 2.0).unwrap();
        assert!(steady > erratic);
    }

    #[test]
    fn test_temporal_insufficient_samples() {
        assert!(temporal_from_frames(&[frame(0), frame(5)], 0.3).is_none());
    }

    #[test]
    fn test_parse_volumedetect() {
        let stderr = "\
[Parsed_volumedetect_0 @ 0x1] n_samples: 88200
[Parsed_volumedetect_0 @ 0x1] mean_volume: -21.3 dB
[Parsed_volumedetect_0 @ 0x1] max_volume: -4.0 dB";
        assert_eq!(parse_volumedetect(stderr), Some((-21.3, -4.0)));
        assert_eq!(parse_volumedetect("nothing"), None);
    }

    #[test]
    fn test_audio_energy_formula() {
        // base (−15+30)/30*100 = 50, bonus min(0.5*10, 15) = 5
        assert!((audio_energy_from_levels(-15.0, -5.0) - 55.0).abs() < 1e-9);
        // loud with wide range: base clamps to 100, bonus caps at 15
        assert!((audio_energy_from_levels(0.0, 40.0) - 115.0).abs() < 1e-9);
        // silence
        assert_eq!(
            audio_energy_from_levels(f64::NEG_INFINITY, f64::NEG_INFINITY),
            0.0
        );
    }

    #[test]
    fn test_event_bonus_takes_max_within_window() {
        let events = vec![event(10.0, 0.5), event(12.0, 0.9), event(20.0, 1.0)];
        assert!((event_bonus(&events, 11.0) - 36.0).abs() < 1e-9);
        assert_eq!(event_bonus(&events, 50.0), 0.0);
        assert_eq!(event_bonus(&[], 11.0), 0.0);
    }
}
