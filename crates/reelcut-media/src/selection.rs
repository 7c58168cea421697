//! Signal fusion and greedy highlight selection.

use std::path::Path;

use reelcut_models::{ScoredSegment, Selection, SelectionEntry, SignalBundle};

/// Weight of the (x2 rescaled) motion signal.
pub const MOTION_WEIGHT: f64 = 0.40;
/// Weight of the audio energy signal.
pub const AUDIO_WEIGHT: f64 = 0.35;
/// Weight of the temporal consistency signal.
pub const TEMPORAL_WEIGHT: f64 = 0.25;
/// Default longest single take in seconds.
pub const DEFAULT_MAX_TAKE_SECS: f64 = 4.0;
/// Shortest take the greedy fill aims for while budget remains.
pub const MIN_TAKE_SECS: f64 = 1.0;

/// Weighted linear fusion of a signal bundle.
///
/// Motion is doubled before weighting since raw pixel differences sit well
/// below the other signals' range. The event bonus is added unweighted.
pub fn fuse(signals: &SignalBundle) -> f64 {
    MOTION_WEIGHT * (signals.motion * 2.0)
        + AUDIO_WEIGHT * signals.audio_energy
        + TEMPORAL_WEIGHT * signals.temporal_consistency
        + signals.event_bonus
}

/// Stable descending sort by fused score; ties keep detection order.
pub fn rank(candidates: &[ScoredSegment]) -> Vec<ScoredSegment> {
    let mut ranked = candidates.to_vec();
    ranked.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score));
    ranked
}

/// Greedily fill `target_duration` with the best-scoring takes.
///
/// Entries stay in score order. Each take is at most `max_take` seconds and
/// never more than the budget left, so the total never exceeds the target.
/// With no candidates at all, `fallback_source` (the first input) is used
/// from its start for the whole target.
pub fn select(
    candidates: &[ScoredSegment],
    target_duration: f64,
    max_take: f64,
    fallback_source: Option<&Path>,
) -> Selection {
    let target = target_duration.max(0.0);
    let max_take = max_take.max(MIN_TAKE_SECS);

    if candidates.is_empty() {
        return match fallback_source {
            Some(source) => Selection::new(vec![SelectionEntry {
                source_path: source.to_path_buf(),
                start: 0.0,
                take_duration: target,
            }]),
            None => Selection::default(),
        };
    }

    let ranked = rank(candidates);
    let mut entries = Vec::new();
    let mut accumulated = 0.0;

    for candidate in &ranked {
        let remaining = target - accumulated;
        if remaining <= f64::EPSILON {
            break;
        }
        let take = candidate
            .duration()
            .min(remaining.clamp(MIN_TAKE_SECS, max_take))
            .min(remaining);
        if take <= 0.0 {
            continue;
        }
        entries.push(SelectionEntry {
            source_path: candidate.segment.source_path.clone(),
            start: candidate.segment.start_seconds,
            take_duration: take,
        });
        accumulated += take;
    }

    if entries.is_empty() {
        let top = &ranked[0];
        entries.push(SelectionEntry {
            source_path: top.segment.source_path.clone(),
            start: top.segment.start_seconds,
            take_duration: target.min(top.duration()),
        });
    }

    Selection::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcut_models::Segment;

    fn candidate(source: &str, start: f64, end: f64, score: f64) -> ScoredSegment {
        ScoredSegment::new(
            Segment::new(source, start, end),
            SignalBundle::default(),
            score,
        )
    }

    fn bundle(motion: f64, audio: f64, temporal: f64) -> SignalBundle {
        SignalBundle {
            motion,
            audio_energy: audio,
            temporal_consistency: temporal,
            event_bonus: 0.0,
        }
    }

    #[test]
    fn test_fuse_weights() {
        let score = fuse(&SignalBundle {
            motion: 10.0,
            audio_energy: 50.0,
            temporal_consistency: 40.0,
            event_bonus: 8.0,
        });
        // 0.4*20 + 0.35*50 + 0.25*40 + 8
        assert!((score - 43.5).abs() < 1e-9);
    }

    #[test]
    fn test_fusion_is_monotonic_in_each_signal() {
        let base = bundle(10.0, 30.0, 50.0);
        let base_score = fuse(&base);
        for delta in [0.0, 0.5, 10.0, 90.0] {
            assert!(fuse(&bundle(10.0 + delta, 30.0, 50.0)) >= base_score);
            assert!(fuse(&bundle(10.0, 30.0 + delta, 50.0)) >= base_score);
            assert!(fuse(&bundle(10.0, 30.0, 50.0 + delta)) >= base_score);
        }
    }

    #[test]
    fn test_rank_is_stable_for_ties() {
        let candidates = vec![
            candidate("a.mp4", 0.0, 5.0, 10.0),
            candidate("b.mp4", 0.0, 5.0, 20.0),
            candidate("a.mp4", 5.0, 9.0, 10.0),
        ];
        let ranked = rank(&candidates);
        assert_eq!(ranked[0].segment.source_path, Path::new("b.mp4"));
        assert_eq!(ranked[1].segment.start_seconds, 0.0);
        assert_eq!(ranked[2].segment.start_seconds, 5.0);
    }

    #[test]
    fn test_select_respects_target_and_score_order() {
        let candidates = vec![
            candidate("a.mp4", 0.0, 10.0, 5.0),
            candidate("a.mp4", 10.0, 12.0, 50.0),
            candidate("b.mp4", 3.0, 20.0, 30.0),
            candidate("b.mp4", 20.0, 21.5, 40.0),
        ];

        let selection = select(&candidates, 9.0, 4.0, None);
        let takes: Vec<(f64, f64)> = selection
            .entries
            .iter()
            .map(|e| (e.start, e.take_duration))
            .collect();

        // 2.0 from the 50-score segment, 1.5 from 40, 4.0 from 30, 1.5 remaining from 5
        assert_eq!(takes, vec![(10.0, 2.0), (20.0, 1.5), (3.0, 4.0), (0.0, 1.5)]);
        assert!(selection.total_duration() <= 9.0 + 1e-9);
    }

    #[test]
    fn test_select_never_exceeds_target() {
        let candidates: Vec<ScoredSegment> = (0..20)
            .map(|i| candidate("a.mp4", i as f64 * 3.0, i as f64 * 3.0 + 2.7, (i % 7) as f64))
            .collect();

        for target in [0.0, 0.3, 1.0, 2.5, 7.7, 30.0, 1000.0] {
            let selection = select(&candidates, target, 4.0, None);
            assert!(!selection.is_empty());
            assert!(
                selection.total_duration() <= target + 1e-9,
                "target {target} total {}",
                selection.total_duration()
            );
        }
    }

    #[test]
    fn test_select_is_deterministic() {
        let candidates = vec![
            candidate("a.mp4", 0.0, 3.0, 1.0),
            candidate("b.mp4", 0.0, 3.0, 1.0),
            candidate("c.mp4", 0.0, 3.0, 1.0),
        ];
        let first = select(&candidates, 5.0, 4.0, None);
        let second = select(&candidates, 5.0, 4.0, None);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.entries[0].source_path, Path::new("a.mp4"));
    }

    #[test]
    fn test_no_candidates_uses_first_source() {
        let selection = select(&[], 30.0, 4.0, Some(Path::new("first.mp4")));
        assert_eq!(selection.len(), 1);
        assert_eq!(selection.entries[0].start, 0.0);
        assert_eq!(selection.entries[0].take_duration, 30.0);

        assert!(select(&[], 30.0, 4.0, None).is_empty());
    }

    #[test]
    fn test_zero_target_falls_back_to_top_candidate() {
        let candidates = vec![
            candidate("a.mp4", 0.0, 3.0, 1.0),
            candidate("b.mp4", 4.0, 6.0, 9.0),
        ];
        let selection = select(&candidates, 0.0, 4.0, None);
        assert_eq!(selection.len(), 1);
        assert_eq!(selection.entries[0].source_path, Path::new("b.mp4"));
        assert_eq!(selection.entries[0].take_duration, 0.0);
    }
}
