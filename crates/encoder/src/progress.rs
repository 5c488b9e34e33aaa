// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress parsing for the encoder contract.
//!
//! Input is the newline-delimited key/value stream ffmpeg emits under
//! `-progress`. Recognized keys: `out_time_ms` (microseconds since
//! source start), `speed` (trailing `x`), `fps`, `bitrate` (trailing
//! `kbits/s`), `progress` (`continue`/`end`). Unknown keys are ignored.
//!
//! Updates flow into a bounded channel with drop-on-overflow: the
//! producer never blocks, progress is a hint, but the terminal event is
//! always delivered.

use cf_plugin::contracts::TaskProgress;
use tokio::sync::mpsc;
use tracing::trace;

/// Channel depth for progress fan-out.
pub const PROGRESS_BUFFER: usize = 32;

/// Incremental parser for one task's progress stream.
///
/// Feed lines as they arrive; a [`TaskProgress`] is emitted when a
/// `progress=` line closes a block. Percent is clamped monotone
/// non-decreasing across the task's lifetime.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    task_id: String,
    duration_seconds: f64,
    last_percent: f64,
    out_time_us: u64,
    speed: f64,
    fps: f64,
    bitrate: u64,
}

impl ProgressParser {
    pub fn new(task_id: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            task_id: task_id.into(),
            duration_seconds,
            last_percent: 0.0,
            out_time_us: 0,
            speed: 0.0,
            fps: 0.0,
            bitrate: 0,
        }
    }

    /// Consume one line. Returns an update when the line closes a block.
    pub fn feed_line(&mut self, line: &str) -> Option<TaskProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time_ms" => {
                self.out_time_us = value.parse().unwrap_or(self.out_time_us);
                None
            }
            "speed" => {
                self.speed = value.trim_end_matches('x').trim().parse().unwrap_or(0.0);
                None
            }
            "fps" => {
                self.fps = value.parse().unwrap_or(0.0);
                None
            }
            "bitrate" => {
                let kbits: f64 = value.trim_end_matches("kbits/s").trim().parse().unwrap_or(0.0);
                self.bitrate = (kbits * 1000.0) as u64;
                None
            }
            "progress" => {
                let completed = value == "end";
                Some(self.emit(completed))
            }
            _ => {
                trace!(key, "ignoring unknown progress key");
                None
            }
        }
    }

    fn emit(&mut self, completed: bool) -> TaskProgress {
        let raw = if self.duration_seconds > 0.0 {
            (self.out_time_us as f64 / 10_000.0 / self.duration_seconds).min(100.0)
        } else {
            0.0
        };
        // Regressions clamp to the last reported value
        if raw > self.last_percent {
            self.last_percent = raw;
        }
        TaskProgress {
            task_id: self.task_id.clone(),
            percent: if completed { 100.0 } else { self.last_percent },
            speed: self.speed,
            fps: self.fps,
            bitrate: self.bitrate,
            current_time: self.out_time_us as f64 / 1_000_000.0,
            completed,
        }
    }

    pub fn last_percent(&self) -> f64 {
        self.last_percent
    }
}

/// Sending half of a progress channel with the drop/always-deliver split.
pub struct ProgressSender {
    tx: mpsc::Sender<TaskProgress>,
}

impl ProgressSender {
    pub fn channel() -> (Self, mpsc::Receiver<TaskProgress>) {
        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        (Self { tx }, rx)
    }

    /// Non-blocking; a full channel drops the update.
    pub fn send_update(&self, progress: TaskProgress) {
        debug_assert!(!progress.completed, "terminal events go through send_terminal");
        let _ = self.tx.try_send(progress);
    }

    /// Terminal event: waits for capacity, completion may not be lost.
    pub async fn send_terminal(&self, progress: TaskProgress) {
        let _ = self.tx.send(progress).await;
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
