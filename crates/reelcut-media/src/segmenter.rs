//! Scene-change segmentation.
//!
//! Runs ffmpeg's scene score over a down-sampled copy of the stream and turns
//! the detected cut times into contiguous [`Segment`]s.

use std::path::Path;
use tracing::{debug, info};

use reelcut_models::{Segment, MIN_SEGMENT_SECS};

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::probe::get_duration;
use crate::tools::MediaTools;

/// Frames per second fed to the scene detector.
pub const DETECT_FPS: u32 = 5;
/// Scene score above which a frame counts as a cut.
pub const SCENE_THRESHOLD: f64 = 0.3;
/// Length of the whole-file segment used when no cuts are found.
pub const FALLBACK_SEGMENT_SECS: f64 = 30.0;

/// Build the detector filter graph.
pub fn scene_filter(fps: u32, threshold: f64) -> String {
    format!("fps={},select='gt(scene,{})',showinfo", fps, threshold)
}

/// Split a video into scenes.
///
/// Never returns an empty list: zero detected cuts yield exactly one
/// `(0, 30)` segment which callers clip to the real duration.
pub async fn detect_segments(tools: &MediaTools, video_path: &Path) -> MediaResult<Vec<Segment>> {
    let duration = get_duration(tools, video_path).await?;

    let cmd = FfmpegCommand::to_sink("-")
        .log_level("info")
        .input(video_path)
        .video_filter(scene_filter(DETECT_FPS, SCENE_THRESHOLD))
        .output_arg("-an")
        .format("null");

    let output = tools.ffmpeg(cmd).await?;
    let cuts = parse_scene_cuts(&output.stderr);
    debug!(
        path = %video_path.display(),
        cuts = cuts.len(),
        duration,
        "Scene detection finished"
    );

    let segments = segments_from_cuts(video_path, &cuts, duration);
    info!(
        path = %video_path.display(),
        segments = segments.len(),
        "Detected segments"
    );
    Ok(segments)
}

/// Extract `pts_time` values from showinfo lines.
pub fn parse_scene_cuts(stderr: &str) -> Vec<f64> {
    let mut cuts: Vec<f64> = stderr
        .lines()
        .filter(|line| line.contains("showinfo"))
        .filter_map(|line| {
            let rest = line.split("pts_time:").nth(1)?;
            rest.split_whitespace().next()?.parse::<f64>().ok()
        })
        .filter(|t| t.is_finite() && *t > 0.0)
        .collect();

    cuts.sort_by(|a, b| a.total_cmp(b));
    cuts.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
    cuts
}

/// Turn cut times plus the media duration into ordered, disjoint segments.
pub fn segments_from_cuts(video_path: &Path, cuts: &[f64], duration: f64) -> Vec<Segment> {
    let inner: Vec<f64> = cuts
        .iter()
        .copied()
        .filter(|t| *t > 0.0 && (duration <= 0.0 || *t < duration))
        .collect();

    if inner.is_empty() {
        return vec![Segment::new(video_path, 0.0, FALLBACK_SEGMENT_SECS)];
    }

    let mut boundaries = Vec::with_capacity(inner.len() + 2);
    boundaries.push(0.0);
    boundaries.extend(inner);
    if duration > 0.0 {
        boundaries.push(duration);
    }

    let segments: Vec<Segment> = boundaries
        .windows(2)
        .filter(|w| w[1] - w[0] >= MIN_SEGMENT_SECS)
        .map(|w| Segment::new(video_path, w[0], w[1]))
        .collect();

    if segments.is_empty() {
        return vec![Segment::new(video_path, 0.0, FALLBACK_SEGMENT_SECS)];
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOWINFO: &str = "\
[Parsed_showinfo_2 @ 0x55d] n:   0 pts:  12800 pts_time:1.0     duration:512 fmt:yuv420p
[Parsed_showinfo_2 @ 0x55d] n:   1 pts:  96000 pts_time:7.5     duration:512 fmt:yuv420p
frame=    2 fps=0.0 q=-0.0 size=N/A time=00:00:07.50
[Parsed_showinfo_2 @ 0x55d] n:   2 pts: 96100 pts_time:7.55 duration:512 fmt:yuv420p
";

    #[test]
    fn test_parse_scene_cuts() {
        let cuts = parse_scene_cuts(SHOWINFO);
        assert_eq!(cuts, vec![1.0, 7.5, 7.55]);
    }

    #[test]
    fn test_segments_from_cuts_drops_short_pairs() {
        let path = Path::new("clip.mp4");
        let segments = segments_from_cuts(path, &[1.0, 7.5, 7.55], 12.0);

        let bounds: Vec<(f64, f64)> = segments
            .iter()
            .map(|s| (s.start_seconds, s.end_seconds))
            .collect();
        assert_eq!(bounds, vec![(0.0, 1.0), (1.0, 7.5), (7.55, 12.0)]);
        assert!(segments.iter().all(|s| s.duration() >= MIN_SEGMENT_SECS));
    }

    #[test]
    fn test_no_cuts_yields_single_fallback_segment() {
        let path = Path::new("static.mp4");
        let segments = segments_from_cuts(path, &[], 120.0);
        assert_eq!(segments, vec![Segment::new(path, 0.0, 30.0)]);

        let segments = segments_from_cuts(path, &parse_scene_cuts("no showinfo here"), 5.0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end_seconds, FALLBACK_SEGMENT_SECS);
    }

    #[test]
    fn test_cuts_beyond_duration_are_ignored() {
        let segments = segments_from_cuts(Path::new("a.mp4"), &[4.0, 50.0], 10.0);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].end_seconds, 10.0);
    }

    #[test]
    fn test_scene_filter() {
        assert_eq!(
            scene_filter(5, 0.3),
            "fps=5,select='gt(scene,0.3)',showinfo"
        );
    }
}
