// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kernel events.
//!
//! Events are facts about what happened; materialized state is derived
//! from them. Serializes with `{"type": "domain:verb", ...fields}`.
//!
//! # Idempotency requirement
//!
//! Every state handler applying these events MUST be idempotent: applying
//! the same event twice must produce the same state as applying it once.
//! Events are applied both for immediate visibility and again during WAL
//! replay after a crash.
//!
//! Transient events ([`Event::is_transient`]) update in-memory state but
//! are never journaled: per-second progress and telemetry are hints, and
//! losing them across a restart is acceptable by contract.

use crate::error::KernelError;
use crate::job::{JobId, JobState};
use crate::plugin::{PluginHealth, PluginManifest};
use crate::stream::{LiveStream, RestreamTarget, StreamId};
use crate::task::{Task, TaskId};
use crate::worker::{Worker, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::job::Job;

/// Events that drive state transitions in the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- jobs --
    /// A submission was accepted. Carries the full initial record so
    /// replay needs no external context.
    #[serde(rename = "job:created")]
    JobCreated { job: Job },

    /// Decomposition produced the task batch; persisted in one event so
    /// the batch is atomic.
    #[serde(rename = "job:planned")]
    JobPlanned {
        job_id: JobId,
        source_duration: f64,
        tasks: Vec<Task>,
    },

    #[serde(rename = "job:advanced")]
    JobAdvanced {
        id: JobId,
        state: JobState,
        epoch_ms: u64,
    },

    #[serde(rename = "job:failed")]
    JobFailed {
        id: JobId,
        error: KernelError,
        epoch_ms: u64,
    },

    #[serde(rename = "job:cancelled")]
    JobCancelled { id: JobId, epoch_ms: u64 },

    #[serde(rename = "job:deleted")]
    JobDeleted { id: JobId },

    /// Stitched artifact uploaded.
    #[serde(rename = "job:stitched")]
    JobStitched { id: JobId, output_key: String },

    /// Debug artifacts of a failed/cancelled job passed their retention
    /// window and were garbage-collected.
    #[serde(rename = "job:artifacts_purged")]
    JobArtifactsPurged { id: JobId, epoch_ms: u64 },

    // -- tasks --
    #[serde(rename = "task:claimed")]
    TaskClaimed {
        task_id: TaskId,
        job_id: JobId,
        worker_id: WorkerId,
        epoch_ms: u64,
    },

    /// Transient: progress hint, applied but not journaled.
    #[serde(rename = "task:progress")]
    TaskProgressed {
        task_id: TaskId,
        job_id: JobId,
        percent: f64,
    },

    #[serde(rename = "task:completed")]
    TaskCompleted {
        task_id: TaskId,
        job_id: JobId,
        worker_id: WorkerId,
        output_key: String,
        output_size: u64,
        epoch_ms: u64,
    },

    #[serde(rename = "task:failed")]
    TaskFailed {
        task_id: TaskId,
        job_id: JobId,
        error: KernelError,
        epoch_ms: u64,
    },

    /// Retriable failure scheduled for another attempt: back to Pending.
    #[serde(rename = "task:requeued")]
    TaskRequeued {
        task_id: TaskId,
        job_id: JobId,
        epoch_ms: u64,
    },

    /// Worker loss: back to Pending with the attempt refunded.
    #[serde(rename = "task:reverted")]
    TaskReverted {
        task_id: TaskId,
        job_id: JobId,
        epoch_ms: u64,
    },

    // -- workers --
    /// Heartbeat upsert.
    #[serde(rename = "worker:seen")]
    WorkerSeen { worker: Worker },

    #[serde(rename = "worker:lost")]
    WorkerLost { worker_id: WorkerId, epoch_ms: u64 },

    #[serde(rename = "worker:deleted")]
    WorkerDeleted { worker_id: WorkerId },

    // -- live streams --
    #[serde(rename = "live:created")]
    StreamCreated { stream: LiveStream },

    #[serde(rename = "live:started")]
    StreamStarted { stream_id: StreamId, epoch_ms: u64 },

    #[serde(rename = "live:ended")]
    StreamEnded {
        stream_id: StreamId,
        epoch_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        archive_job_id: Option<JobId>,
    },

    /// Transient: per-second telemetry, applied but not journaled.
    #[serde(rename = "live:telemetry")]
    StreamTelemetry {
        stream_id: StreamId,
        is_live: bool,
        bitrate: u64,
        fps: f64,
        viewers: u64,
    },

    #[serde(rename = "live:restream_added")]
    RestreamAdded {
        stream_id: StreamId,
        target: RestreamTarget,
    },

    #[serde(rename = "live:restream_removed")]
    RestreamRemoved {
        stream_id: StreamId,
        ingest_url: String,
    },

    #[serde(rename = "live:restream_toggled")]
    RestreamToggled {
        stream_id: StreamId,
        ingest_url: String,
        enabled: bool,
    },

    #[serde(rename = "live:deleted")]
    StreamDeleted { stream_id: StreamId },

    // -- publishing --
    #[serde(rename = "publish:succeeded")]
    PublishSucceeded {
        job_id: JobId,
        platform: String,
        platform_id: String,
        url: String,
        attempts: u32,
    },

    #[serde(rename = "publish:failed")]
    PublishFailed {
        job_id: JobId,
        platform: String,
        error: KernelError,
        attempts: u32,
    },

    // -- plugins --
    #[serde(rename = "plugin:installed")]
    PluginInstalled { manifest: PluginManifest },

    /// Config binding; values with secret-reference keys stay in the
    /// config store only and are stripped before any outbound surface.
    #[serde(rename = "plugin:configured")]
    PluginConfigured {
        plugin_id: String,
        config: HashMap<String, String>,
    },

    #[serde(rename = "plugin:health")]
    PluginHealthChanged {
        plugin_id: String,
        health: PluginHealth,
    },

    #[serde(rename = "plugin:removed")]
    PluginRemoved { plugin_id: String },

    // -- errors --
    #[serde(rename = "error:raised")]
    ErrorRecorded { error: KernelError },

    /// Graceful shutdown marker.
    #[serde(rename = "kernel:shutdown")]
    Shutdown,
}

impl Event {
    /// Short name for tracing spans and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Event::JobCreated { .. } => "job:created",
            Event::JobPlanned { .. } => "job:planned",
            Event::JobAdvanced { .. } => "job:advanced",
            Event::JobFailed { .. } => "job:failed",
            Event::JobCancelled { .. } => "job:cancelled",
            Event::JobDeleted { .. } => "job:deleted",
            Event::JobStitched { .. } => "job:stitched",
            Event::JobArtifactsPurged { .. } => "job:artifacts_purged",
            Event::TaskClaimed { .. } => "task:claimed",
            Event::TaskProgressed { .. } => "task:progress",
            Event::TaskCompleted { .. } => "task:completed",
            Event::TaskFailed { .. } => "task:failed",
            Event::TaskRequeued { .. } => "task:requeued",
            Event::TaskReverted { .. } => "task:reverted",
            Event::WorkerSeen { .. } => "worker:seen",
            Event::WorkerLost { .. } => "worker:lost",
            Event::WorkerDeleted { .. } => "worker:deleted",
            Event::StreamCreated { .. } => "live:created",
            Event::StreamStarted { .. } => "live:started",
            Event::StreamEnded { .. } => "live:ended",
            Event::StreamTelemetry { .. } => "live:telemetry",
            Event::RestreamAdded { .. } => "live:restream_added",
            Event::RestreamRemoved { .. } => "live:restream_removed",
            Event::RestreamToggled { .. } => "live:restream_toggled",
            Event::StreamDeleted { .. } => "live:deleted",
            Event::PublishSucceeded { .. } => "publish:succeeded",
            Event::PublishFailed { .. } => "publish:failed",
            Event::PluginInstalled { .. } => "plugin:installed",
            Event::PluginConfigured { .. } => "plugin:configured",
            Event::PluginHealthChanged { .. } => "plugin:health",
            Event::PluginRemoved { .. } => "plugin:removed",
            Event::ErrorRecorded { .. } => "error:raised",
            Event::Shutdown => "kernel:shutdown",
        }
    }

    /// Transient events mutate in-memory state but skip the WAL.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Event::TaskProgressed { .. } | Event::StreamTelemetry { .. }
        )
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
