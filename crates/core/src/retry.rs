// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified retry policy.
//!
//! One backoff curve is shared by the task router, the publisher router,
//! and plugin restart logic: exponential from a 5 s base, capped at
//! 5 min, 3 attempts by default. Profiles may override the attempt count.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Exponential backoff with a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    pub base_ms: u64,
    pub cap_ms: u64,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_ms: 5_000,
            cap_ms: 300_000,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Backoff {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self { max_attempts, ..Self::default() }
    }

    /// Delay before re-running after `attempt` failed attempts.
    ///
    /// The first retry (attempt = 1) waits the base delay; each further
    /// attempt doubles it, saturating at the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let ms = self
            .base_ms
            .saturating_mul(1u64 << exp)
            .min(self.cap_ms);
        Duration::from_millis(ms)
    }

    /// True when `attempt` failures mean no further attempt is allowed.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
