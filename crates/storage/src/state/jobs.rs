// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job and publish-outcome event handlers.

use cf_core::{Event, JobState, PublishStatus, TaskStatus};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::JobCreated { job } => {
            // Guarded insert: replaying a create must not clobber progress
            if !state.jobs.contains_key(job.id.as_str()) {
                state.jobs.insert(job.id.to_string(), job.clone());
            }
        }

        Event::JobPlanned { job_id, source_duration, tasks } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.source_duration = Some(*source_duration);
            }
            // The batch is atomic: either the full plan is present or none
            state
                .tasks
                .entry(job_id.to_string())
                .or_insert_with(|| tasks.clone());
        }

        Event::JobAdvanced { id, state: next, epoch_ms } => {
            if let Some(job) = state.jobs.get_mut(id.as_str()) {
                // Illegal edges can only appear through replay of a log
                // written by a newer kernel; refuse rather than corrupt.
                let _ = job.advance(*next, *epoch_ms);
            }
        }

        Event::JobFailed { id, error, epoch_ms } => {
            if let Some(job) = state.jobs.get_mut(id.as_str()) {
                if job.advance(JobState::Failed, *epoch_ms).is_ok() {
                    job.error = Some(error.clone());
                }
            }
        }

        Event::JobCancelled { id, epoch_ms } => {
            if let Some(job) = state.jobs.get_mut(id.as_str()) {
                let _ = job.advance(JobState::Cancelled, *epoch_ms);
            }
            // In-flight tasks of a cancelled job stop counting toward
            // worker budgets immediately.
            if let Some(tasks) = state.tasks.get_mut(id.as_str()) {
                for task in tasks.iter_mut() {
                    if task.status == TaskStatus::InFlight {
                        task.revert();
                    }
                }
            }
        }

        Event::JobStitched { id, output_key } => {
            if let Some(job) = state.jobs.get_mut(id.as_str()) {
                job.output_key = Some(output_key.clone());
            }
        }

        Event::JobArtifactsPurged { id, .. } => {
            if let Some(job) = state.jobs.get_mut(id.as_str()) {
                job.output_key = None;
            }
            if let Some(tasks) = state.tasks.get_mut(id.as_str()) {
                for task in tasks.iter_mut() {
                    task.output_key = None;
                    task.output_size = None;
                }
            }
        }

        Event::JobDeleted { id } => {
            state.jobs.remove(id.as_str());
            state.tasks.remove(id.as_str());
        }

        Event::PublishSucceeded { job_id, platform, platform_id, url, attempts } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.record_publish_outcome(
                    platform,
                    PublishStatus::Published {
                        platform_id: platform_id.clone(),
                        url: url.clone(),
                    },
                    *attempts,
                );
            }
        }

        Event::PublishFailed { job_id, platform, error, attempts } => {
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                job.record_publish_outcome(
                    platform,
                    PublishStatus::Failed { error: error.clone() },
                    *attempts,
                );
            }
        }

        _ => {}
    }
}
