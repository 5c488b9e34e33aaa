// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rolling RPC error window and health classification.
//!
//! Thresholds: error rate above 5% over the last minute degrades an
//! instance; above 10% sustained for two minutes fails it. Failed
//! instances restart with capped exponential backoff; five consecutive
//! failed restarts disable the plugin until an admin unblocks it.

use cf_core::PluginHealth;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Degraded above this rate over [`DEGRADE_WINDOW_MS`].
pub const DEGRADE_RATE: f64 = 0.05;
/// Failed above this rate sustained over [`FAIL_WINDOW_MS`].
pub const FAIL_RATE: f64 = 0.10;
pub const DEGRADE_WINDOW_MS: u64 = 60_000;
pub const FAIL_WINDOW_MS: u64 = 120_000;
/// Consecutive failed restarts before an instance is disabled.
pub const MAX_CONSECUTIVE_RESTARTS: u32 = 5;

/// Don't classify on thin evidence; a single early failure is not a 100%
/// error rate.
const MIN_SAMPLES: usize = 5;

/// Oldest samples pruned past the failure window.
const RETENTION_MS: u64 = FAIL_WINDOW_MS;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at_ms: u64,
    ok: bool,
}

/// Shared rolling window of call outcomes for one plugin instance.
#[derive(Debug, Default)]
pub struct ErrorWindow {
    samples: Mutex<VecDeque<Sample>>,
}

impl ErrorWindow {
    /// Record one call outcome.
    pub fn record(&self, at_ms: u64, ok: bool) {
        let mut samples = self.samples.lock();
        samples.push_back(Sample { at_ms, ok });
        while let Some(front) = samples.front() {
            if at_ms.saturating_sub(front.at_ms) > RETENTION_MS {
                samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Error rate over the trailing `window_ms`, with the sample count.
    pub fn error_rate(&self, now_ms: u64, window_ms: u64) -> (f64, usize) {
        let samples = self.samples.lock();
        let mut total = 0usize;
        let mut errors = 0usize;
        for sample in samples.iter() {
            if now_ms.saturating_sub(sample.at_ms) <= window_ms {
                total += 1;
                if !sample.ok {
                    errors += 1;
                }
            }
        }
        if total == 0 {
            (0.0, 0)
        } else {
            (errors as f64 / total as f64, total)
        }
    }

    /// Lifetime (ok, error) counts currently retained (tests, status).
    pub fn totals(&self) -> (usize, usize) {
        let samples = self.samples.lock();
        let errors = samples.iter().filter(|s| !s.ok).count();
        (samples.len() - errors, errors)
    }

    /// Forget history (after restart or traffic flip).
    pub fn reset(&self) {
        self.samples.lock().clear();
    }

    /// Classify against the degrade/fail thresholds.
    ///
    /// Healthy instances need [`MIN_SAMPLES`] in the degrade window
    /// before any downgrade; the fail check additionally requires the
    /// oldest considered sample to span the full failure window so a
    /// burst right after startup cannot fail an instance instantly.
    pub fn classify(&self, now_ms: u64) -> PluginHealth {
        let (fail_rate, fail_samples) = self.error_rate(now_ms, FAIL_WINDOW_MS);
        if fail_samples >= MIN_SAMPLES && fail_rate > FAIL_RATE && self.spans(now_ms, FAIL_WINDOW_MS)
        {
            return PluginHealth::Failed;
        }
        let (degrade_rate, degrade_samples) = self.error_rate(now_ms, DEGRADE_WINDOW_MS);
        if degrade_samples >= MIN_SAMPLES && degrade_rate > DEGRADE_RATE {
            return PluginHealth::Degraded;
        }
        PluginHealth::Healthy
    }

    /// Whether retained samples reach back at least `window_ms`.
    fn spans(&self, now_ms: u64, window_ms: u64) -> bool {
        self.samples
            .lock()
            .front()
            .is_some_and(|s| now_ms.saturating_sub(s.at_ms) >= window_ms)
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
