// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task attempt event handlers.

use cf_core::{Event, TaskStatus};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::TaskClaimed { task_id, job_id, worker_id, .. } => {
            if let Some(task) = state.task_mut(job_id.as_str(), task_id.as_str()) {
                // Guard the attempt increment behind the status transition
                // so replay stays idempotent.
                if task.status == TaskStatus::Pending {
                    let _ = task.claim(worker_id.clone());
                }
            }
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.worker_hint = Some(worker_id.clone());
            }
        }

        Event::TaskProgressed { task_id, job_id, percent } => {
            if let Some(task) = state.task_mut(job_id.as_str(), task_id.as_str()) {
                task.report_progress(*percent);
            }
        }

        Event::TaskCompleted { task_id, job_id, output_key, output_size, .. } => {
            if let Some(task) = state.task_mut(job_id.as_str(), task_id.as_str()) {
                // A late completion after job failure is still recorded;
                // the artifact is garbage-collected separately.
                task.complete(output_key.clone(), *output_size);
            }
        }

        Event::TaskFailed { task_id, job_id, error, .. } => {
            if let Some(task) = state.task_mut(job_id.as_str(), task_id.as_str()) {
                if task.status != TaskStatus::Completed {
                    task.fail(error.clone());
                }
            }
        }

        Event::TaskRequeued { task_id, job_id, .. } => {
            if let Some(task) = state.task_mut(job_id.as_str(), task_id.as_str()) {
                if task.status == TaskStatus::Failed {
                    task.requeue();
                }
            }
        }

        Event::TaskReverted { task_id, job_id, .. } => {
            if let Some(task) = state.task_mut(job_id.as_str(), task_id.as_str()) {
                task.revert();
            }
        }

        _ => {}
    }
}
