// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyframe-aligned segment boundary computation.
//!
//! Segments share boundaries (end of one is start of the next) and their
//! union covers `[0, duration)` exactly. Boundaries land on keyframes
//! whenever the source has usable ones; otherwise fixed-duration spans.

use serde::{Deserialize, Serialize};

/// One planned segment, `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }
}

/// Planner knobs. Defaults: target 30 s, min 10 s, max 120 s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub target_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self { target_secs: 30.0, min_secs: 10.0, max_secs: 120.0 }
    }
}

impl SegmentConfig {
    pub fn with_target(target_secs: f64) -> Self {
        Self { target_secs, ..Self::default() }
    }
}

/// Compute segment boundaries for a source.
///
/// `healthy_workers == 1` short-circuits to a single segment: with no
/// parallelism available, split/stitch overhead buys nothing.
pub fn plan_segments(
    keyframes: &[f64],
    duration: f64,
    config: &SegmentConfig,
    healthy_workers: usize,
) -> Vec<Segment> {
    if duration <= 0.0 {
        return Vec::new();
    }
    if healthy_workers <= 1 || duration <= config.target_secs {
        return vec![Segment { start: 0.0, end: duration }];
    }

    // Keyframes usable as split points: strictly inside (0, duration),
    // ascending, deduplicated.
    let mut usable: Vec<f64> = keyframes
        .iter()
        .copied()
        .filter(|k| *k > 0.0 && *k < duration)
        .collect();
    usable.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    usable.dedup_by(|a, b| (*a - *b).abs() < cf_core::task::BOUNDARY_EPSILON);

    let mut segments = if usable.is_empty() {
        fixed_fallback(duration, config.target_secs)
    } else {
        keyframe_walk(&usable, duration, config.target_secs)
    };

    merge_undersized(&mut segments, config.min_secs);
    split_oversized(&mut segments, config.max_secs);
    segments
}

/// Fixed-duration fallback: equal spans of the target length, the final
/// span absorbing the remainder.
fn fixed_fallback(duration: f64, target: f64) -> Vec<Segment> {
    let full_spans = (duration / target).floor() as usize;
    let count = full_spans.max(1);
    let mut segments = Vec::with_capacity(count);
    for i in 0..count {
        let start = i as f64 * target;
        let end = if i == count - 1 { duration } else { start + target };
        segments.push(Segment { start, end });
    }
    segments
}

/// Walk the keyframe list, closing a segment at the first keyframe at or
/// past the accumulated target. The remainder past the last closed
/// boundary becomes the final segment, extended to the source end.
fn keyframe_walk(keyframes: &[f64], duration: f64, target: f64) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut start = 0.0f64;
    for &kf in keyframes {
        if kf - start >= target {
            segments.push(Segment { start, end: kf });
            start = kf;
        }
    }
    if start < duration {
        segments.push(Segment { start, end: duration });
    }
    segments
}

/// Merge any segment shorter than `min` into a neighbor, preferring the
/// left one.
fn merge_undersized(segments: &mut Vec<Segment>, min: f64) {
    let mut i = 0;
    while i < segments.len() {
        if segments.len() == 1 {
            break;
        }
        if segments[i].len() < min {
            if i > 0 {
                segments[i - 1].end = segments[i].end;
                segments.remove(i);
            } else {
                segments[i + 1].start = segments[i].start;
                segments.remove(i);
            }
            // Re-check from the merge point
            i = i.saturating_sub(1);
        } else {
            i += 1;
        }
    }
}

/// Split any segment longer than `max` at interpolated midpoints. The
/// midpoint is usually not a keyframe; the encoder re-encodes from the
/// nearest preceding keyframe on its own.
fn split_oversized(segments: &mut Vec<Segment>, max: f64) {
    let mut i = 0;
    while i < segments.len() {
        if segments[i].len() > max {
            let mid = segments[i].start + segments[i].len() / 2.0;
            let right = Segment { start: mid, end: segments[i].end };
            segments[i].end = mid;
            segments.insert(i + 1, right);
            // Halves may still exceed max; re-check in place
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
#[path = "segment_tests.rs"]
mod tests;
