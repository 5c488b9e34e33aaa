// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay.

mod errors;
mod helpers;
mod jobs;
mod plugins;
mod streams;
mod tasks;
mod workers;

pub use plugins::PluginRecord;

use cf_core::{Event, Job, KernelError, LiveStream, Task, Worker};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cap on retained error records; older entries fall off the front.
pub(crate) const MAX_ERROR_EVENTS: usize = 1_000;

/// Materialized state built from kernel events.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub jobs: HashMap<String, Job>,
    /// Tasks keyed by job ID, ordered by sequence index.
    #[serde(default)]
    pub tasks: HashMap<String, Vec<Task>>,
    #[serde(default)]
    pub streams: HashMap<String, LiveStream>,
    #[serde(default)]
    pub workers: HashMap<String, Worker>,
    #[serde(default)]
    pub plugins: HashMap<String, PluginRecord>,
    /// Rolling window of structured error records (audit view).
    #[serde(default)]
    pub error_events: Vec<KernelError>,
}

impl MaterializedState {
    /// Get a job by ID or unique prefix (like git commit hashes)
    pub fn get_job(&self, id: &str) -> Option<&Job> {
        helpers::find_by_prefix(&self.jobs, id)
    }

    /// Get a live stream by ID or unique prefix
    pub fn get_stream(&self, id: &str) -> Option<&LiveStream> {
        helpers::find_by_prefix(&self.streams, id)
    }

    /// Tasks of a job in index order (empty slice when not planned yet).
    pub fn tasks_of(&self, job_id: &str) -> &[Task] {
        self.tasks.get(job_id).map_or(&[], Vec::as_slice)
    }

    pub fn task_mut(&mut self, job_id: &str, task_id: &str) -> Option<&mut Task> {
        self.tasks
            .get_mut(job_id)?
            .iter_mut()
            .find(|t| t.id == *task_id)
    }

    /// Apply an event to derive state changes.
    ///
    /// Events are facts about what happened; state is derived from them.
    ///
    /// # Idempotency Requirement
    ///
    /// **All event handlers MUST be idempotent.** Applying the same event
    /// twice must produce the same state as applying it once: events are
    /// applied once for immediate visibility and may be applied again
    /// when the WAL replays after a crash. Guidelines:
    /// - Use assignment (`=`) instead of mutation (`+=`, `-=`)
    /// - Guard inserts with existence checks
    /// - Guard increments behind status transitions
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            // Jobs
            Event::JobCreated { .. }
            | Event::JobPlanned { .. }
            | Event::JobAdvanced { .. }
            | Event::JobFailed { .. }
            | Event::JobCancelled { .. }
            | Event::JobStitched { .. }
            | Event::JobArtifactsPurged { .. }
            | Event::JobDeleted { .. }
            | Event::PublishSucceeded { .. }
            | Event::PublishFailed { .. } => jobs::apply(self, event),

            // Tasks
            Event::TaskClaimed { .. }
            | Event::TaskProgressed { .. }
            | Event::TaskCompleted { .. }
            | Event::TaskFailed { .. }
            | Event::TaskRequeued { .. }
            | Event::TaskReverted { .. } => tasks::apply(self, event),

            // Live streams
            Event::StreamCreated { .. }
            | Event::StreamStarted { .. }
            | Event::StreamEnded { .. }
            | Event::StreamTelemetry { .. }
            | Event::RestreamAdded { .. }
            | Event::RestreamRemoved { .. }
            | Event::RestreamToggled { .. }
            | Event::StreamDeleted { .. } => streams::apply(self, event),

            // Workers
            Event::WorkerSeen { .. } | Event::WorkerLost { .. } | Event::WorkerDeleted { .. } => {
                workers::apply(self, event)
            }

            // Plugins
            Event::PluginInstalled { .. }
            | Event::PluginConfigured { .. }
            | Event::PluginHealthChanged { .. }
            | Event::PluginRemoved { .. } => plugins::apply(self, event),

            // Errors
            Event::ErrorRecorded { .. } => errors::apply(self, event),

            // Pure lifecycle marker
            Event::Shutdown => {}
        }
    }
}

#[cfg(test)]
#[path = "../state_tests.rs"]
mod tests;
