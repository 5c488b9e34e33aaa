// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deadline timers for the engine loop.

use cf_core::{JobId, TaskId};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What to do when a timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wakeup {
    /// Put a retriably-failed task back on the queue.
    RequeueTask { job_id: JobId, task_id: TaskId },
    /// Scan for workers past the heartbeat timeout.
    HeartbeatSweep,
    /// Pull live telemetry and fan it out.
    TelemetryTick,
    /// Probe plugin liveness and reclassify health.
    HealthProbe,
    /// Bus maintenance (redelivery, retention).
    BusSweep,
    /// Snapshot state and truncate the WAL.
    Checkpoint,
    /// Re-publish dispatches for Pending tasks that lost theirs.
    RepublishSweep,
}

#[derive(Debug, Clone)]
struct Timer {
    fires_at: Instant,
    wakeup: Wakeup,
}

/// Manages timers for the engine. Keys allow cancellation (a completed
/// task cancels its pending requeue).
#[derive(Debug, Default)]
pub struct TimerWheel {
    timers: HashMap<String, Timer>,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or reset) a timer.
    pub fn set(&mut self, key: impl Into<String>, wakeup: Wakeup, delay: Duration, now: Instant) {
        self.timers.insert(key.into(), Timer { fires_at: now + delay, wakeup });
    }

    pub fn cancel(&mut self, key: &str) {
        self.timers.remove(key);
    }

    pub fn cancel_with_prefix(&mut self, prefix: &str) {
        self.timers.retain(|key, _| !key.starts_with(prefix));
    }

    /// Remove and return all wakeups that are due.
    pub fn fired(&mut self, now: Instant) -> Vec<Wakeup> {
        let due: Vec<String> = self
            .timers
            .iter()
            .filter(|(_, t)| t.fires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        let mut wakeups = Vec::with_capacity(due.len());
        for key in due {
            if let Some(timer) = self.timers.remove(&key) {
                wakeups.push(timer.wakeup);
            }
        }
        wakeups
    }

    /// Earliest pending deadline (drives the loop's sleep).
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.fires_at).min()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.timers.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

/// Timer key for a task's requeue (cancelled if the job dies first).
pub fn requeue_key(task_id: &TaskId) -> String {
    format!("requeue:{task_id}")
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
