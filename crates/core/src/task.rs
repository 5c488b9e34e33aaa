// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record: one keyframe-aligned time segment of one job.

use crate::error::KernelError;
use crate::job::JobId;
use crate::retry::DEFAULT_MAX_ATTEMPTS;
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a task (one segment attempt unit).
    pub struct TaskId("tsk-");
}

/// Numeric tolerance for segment boundary comparisons.
pub const BOUNDARY_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
}

crate::simple_display! {
    TaskStatus {
        Pending => "pending",
        InFlight => "in_flight",
        Completed => "completed",
        Failed => "failed",
    }
}

/// A task instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    /// Zero-based position in the job's segment sequence.
    pub index: u32,
    /// Segment start offset in seconds (keyframe-aligned when possible).
    pub start_time: f64,
    /// Segment end offset in seconds; equals the next task's start.
    pub end_time: f64,
    pub status: TaskStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<WorkerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,
    /// Last reported progress percent, monotone non-decreasing.
    #[serde(default)]
    pub last_progress_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<KernelError>,
}

impl Task {
    pub fn new(job_id: JobId, index: u32, start_time: f64, end_time: f64) -> Self {
        Self {
            id: TaskId::new(),
            job_id,
            index,
            start_time,
            end_time,
            status: TaskStatus::Pending,
            attempt_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            assigned_worker: None,
            output_key: None,
            output_size: None,
            last_progress_pct: 0.0,
            error: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Contribution to the parent job's aggregate progress.
    pub fn contribution_pct(&self) -> f64 {
        match self.status {
            TaskStatus::Completed => 100.0,
            TaskStatus::InFlight | TaskStatus::Failed => self.last_progress_pct,
            TaskStatus::Pending => 0.0,
        }
    }

    /// Claim the task for a worker: Pending → InFlight, attempt consumed.
    ///
    /// Fails when the task is not claimable or the attempt budget is gone.
    pub fn claim(&mut self, worker: WorkerId) -> Result<(), ClaimError> {
        if self.status != TaskStatus::Pending {
            return Err(ClaimError::NotClaimable(self.status));
        }
        if self.attempt_count >= self.max_attempts {
            return Err(ClaimError::AttemptsExhausted);
        }
        self.status = TaskStatus::InFlight;
        self.attempt_count += 1;
        self.assigned_worker = Some(worker);
        Ok(())
    }

    /// Record a successful attempt.
    pub fn complete(&mut self, output_key: String, output_size: u64) {
        self.status = TaskStatus::Completed;
        self.output_key = Some(output_key);
        self.output_size = Some(output_size);
        self.last_progress_pct = 100.0;
        self.error = None;
    }

    /// Record a failed attempt; the caller decides requeue vs. terminal.
    pub fn fail(&mut self, error: KernelError) {
        self.status = TaskStatus::Failed;
        self.error = Some(error);
    }

    /// Failed attempt that will be retried: back to Pending, attempt kept.
    pub fn requeue(&mut self) {
        self.status = TaskStatus::Pending;
        self.assigned_worker = None;
    }

    /// Worker loss: back to Pending and the in-flight attempt refunded;
    /// losing a worker is not the task's fault.
    pub fn revert(&mut self) {
        if self.status == TaskStatus::InFlight {
            self.status = TaskStatus::Pending;
            self.assigned_worker = None;
            self.attempt_count = self.attempt_count.saturating_sub(1);
        }
    }

    /// Apply a progress report, clamping regressions to the last value.
    pub fn report_progress(&mut self, percent: f64) {
        let clamped = percent.clamp(0.0, 100.0);
        if clamped > self.last_progress_pct {
            self.last_progress_pct = clamped;
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("task not claimable in status {0}")]
    NotClaimable(TaskStatus),
    #[error("attempt budget exhausted")]
    AttemptsExhausted,
}

/// Validate a task batch against the decomposition invariants: indices
/// form a contiguous 0..N-1 range, adjacent boundaries meet exactly, and
/// the union of segments covers `[0, duration)` within tolerance.
pub fn validate_plan(tasks: &[Task], duration: f64) -> Result<(), PlanError> {
    if tasks.is_empty() {
        return Err(PlanError::Empty);
    }
    for (i, task) in tasks.iter().enumerate() {
        if task.index as usize != i {
            return Err(PlanError::IndexGap { expected: i as u32, found: task.index });
        }
        if task.end_time - task.start_time <= 0.0 {
            return Err(PlanError::EmptySegment { index: task.index });
        }
    }
    if tasks[0].start_time.abs() > BOUNDARY_EPSILON {
        return Err(PlanError::CoverageGap { at: 0.0 });
    }
    for pair in tasks.windows(2) {
        if (pair[0].end_time - pair[1].start_time).abs() > BOUNDARY_EPSILON {
            return Err(PlanError::BoundaryMismatch {
                index: pair[1].index,
                end: pair[0].end_time,
                start: pair[1].start_time,
            });
        }
    }
    let last = &tasks[tasks.len() - 1];
    if (last.end_time - duration).abs() > BOUNDARY_EPSILON {
        return Err(PlanError::CoverageGap { at: last.end_time });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("plan contains no segments")]
    Empty,
    #[error("task index gap: expected {expected}, found {found}")]
    IndexGap { expected: u32, found: u32 },
    #[error("segment {index} is empty or negative")]
    EmptySegment { index: u32 },
    #[error("segment {index} starts at {start} but previous ends at {end}")]
    BoundaryMismatch { index: u32, end: f64, start: f64 },
    #[error("plan does not cover source duration (gap at {at}s)")]
    CoverageGap { at: f64 },
}

crate::builder! {
    pub struct TaskBuilder => Task {
        set {
            id: TaskId = TaskId::from_string("tsk-test-1"),
            job_id: JobId = JobId::from_string("job-test-1"),
            index: u32 = 0,
            start_time: f64 = 0.0,
            end_time: f64 = 30.0,
            status: TaskStatus = TaskStatus::Pending,
            attempt_count: u32 = 0,
            max_attempts: u32 = 3,
            last_progress_pct: f64 = 0.0,
        }
        option {
            assigned_worker: WorkerId = None,
            output_key: String = None,
            output_size: u64 = None,
            error: KernelError = None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
