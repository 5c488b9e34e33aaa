// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn bounds(segments: &[Segment]) -> Vec<(f64, f64)> {
    segments.iter().map(|s| (s.start, s.end)).collect()
}

fn assert_covers(segments: &[Segment], duration: f64) {
    assert!((segments[0].start).abs() < 1e-6);
    for pair in segments.windows(2) {
        assert!(
            (pair[0].end - pair[1].start).abs() < 1e-6,
            "boundary mismatch: {:?}",
            bounds(segments)
        );
    }
    let total: f64 = segments.iter().map(Segment::len).sum();
    assert!((total - duration).abs() < 1e-6, "coverage != duration: {:?}", bounds(segments));
}

#[test]
fn single_worker_short_circuit() {
    let keyframes: Vec<f64> = (0..100).map(|n| n as f64 * 2.0).collect();
    let segments = plan_segments(&keyframes, 180.0, &SegmentConfig::default(), 1);
    assert_eq!(bounds(&segments), vec![(0.0, 180.0)]);
}

#[test]
fn short_source_is_one_segment() {
    let segments = plan_segments(&[0.0, 10.0, 20.0], 25.0, &SegmentConfig::default(), 4);
    assert_eq!(bounds(&segments), vec![(0.0, 25.0)]);
}

#[test]
fn keyframe_aligned_split() {
    // Boundaries land exactly on keyframes at the 10s target
    let keyframes = [0.0, 2.5, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0];
    let config = SegmentConfig { target_secs: 10.0, min_secs: 10.0, max_secs: 120.0 };
    let segments = plan_segments(&keyframes, 40.0, &config, 4);

    assert_eq!(
        bounds(&segments),
        vec![(0.0, 10.0), (10.0, 20.0), (20.0, 30.0), (30.0, 40.0)]
    );
    assert_covers(&segments, 40.0);
}

#[test]
fn remainder_extends_past_last_keyframe() {
    let segments =
        plan_segments(&[0.0, 30.0, 60.0], 100.0, &SegmentConfig::with_target(30.0), 4);
    assert_eq!(bounds(&segments), vec![(0.0, 30.0), (30.0, 60.0), (60.0, 100.0)]);
}

#[test]
fn zero_keyframes_fixed_fallback() {
    let segments = plan_segments(&[], 100.0, &SegmentConfig::with_target(30.0), 4);
    assert_eq!(bounds(&segments), vec![(0.0, 30.0), (30.0, 60.0), (60.0, 100.0)]);
    assert_covers(&segments, 100.0);
}

#[test]
fn degenerate_keyframes_fixed_fallback() {
    // A lone keyframe at zero cannot split anything
    let segments = plan_segments(&[0.0], 90.0, &SegmentConfig::with_target(30.0), 4);
    assert_eq!(segments.len(), 3);
    assert_covers(&segments, 90.0);

    // Duplicates collapse to nothing usable
    let segments = plan_segments(&[0.0, 0.0, 0.0], 90.0, &SegmentConfig::with_target(30.0), 4);
    assert_eq!(segments.len(), 3);
}

#[test]
fn tiny_remainder_merges_left() {
    // Remainder [60, 63) is under the 10s minimum: absorbed by [30, 60)
    let segments =
        plan_segments(&[0.0, 30.0, 60.0], 63.0, &SegmentConfig::with_target(30.0), 4);
    assert_eq!(bounds(&segments), vec![(0.0, 30.0), (30.0, 63.0)]);
    assert_covers(&segments, 63.0);
}

#[test]
fn undersized_head_merges_right() {
    let config = SegmentConfig { target_secs: 30.0, min_secs: 10.0, max_secs: 120.0 };
    // Sparse keyframes force a short head segment through the walk only
    // when min-merge pulls it right
    let mut segments = vec![
        Segment { start: 0.0, end: 5.0 },
        Segment { start: 5.0, end: 40.0 },
    ];
    super::merge_undersized(&mut segments, config.min_secs);
    assert_eq!(bounds(&segments), vec![(0.0, 40.0)]);
}

#[test]
fn oversized_segment_splits_at_midpoint() {
    // Keyframes 150s apart exceed the 120s cap
    let segments =
        plan_segments(&[0.0, 150.0], 300.0, &SegmentConfig::with_target(30.0), 4);
    for segment in &segments {
        assert!(segment.len() <= 120.0, "segment over cap: {:?}", bounds(&segments));
    }
    assert_covers(&segments, 300.0);
}

#[test]
fn deep_split_when_far_over_cap() {
    // 600s with no interior keyframes and target 600 → single span far
    // over cap, split recursively
    let config = SegmentConfig { target_secs: 500.0, min_secs: 10.0, max_secs: 120.0 };
    let segments = plan_segments(&[], 600.0, &config, 4);
    for segment in &segments {
        assert!(segment.len() <= 120.0 + 1e-6);
    }
    assert_covers(&segments, 600.0);
}

#[test]
fn zero_duration_plans_nothing() {
    assert!(plan_segments(&[], 0.0, &SegmentConfig::default(), 4).is_empty());
}

#[test]
fn unsorted_keyframes_are_normalized() {
    let segments =
        plan_segments(&[60.0, 30.0, 0.0], 100.0, &SegmentConfig::with_target(30.0), 4);
    assert_eq!(bounds(&segments), vec![(0.0, 30.0), (30.0, 60.0), (60.0, 100.0)]);
}
