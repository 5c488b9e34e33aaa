// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire subjects and bus message DTOs.
//!
//! These are the payloads workers and subscribers see; kernel events
//! (the WAL) are a separate, richer vocabulary.

use cf_bus::{Bus, BusError, StreamPolicy};
use cf_core::{Clock, EncodeProfile, JobId, TaskId, WorkerCaps, WorkerId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const STREAM_WORK: &str = "work";
pub const STREAM_EVENTS: &str = "events";
pub const STREAM_LIVE: &str = "live";

pub mod subjects {
    pub const JOBS_DISPATCH: &str = "jobs.dispatch";
    pub const JOBS_EVENTS: &str = "jobs.events";
    pub const WORKERS_HEARTBEAT: &str = "workers.heartbeat";
    pub const AUDIT_USER_ACTION: &str = "audit.user_action";
    pub const AUDIT_SYSTEM: &str = "audit.system";
    pub const EVENTS_ERROR: &str = "events.error";

    pub fn live_telemetry(stream_id: &str) -> String {
        format!("live.telemetry.{stream_id}")
    }

    pub fn live_lifecycle(stream_id: &str) -> String {
        format!("live.lifecycle.{stream_id}")
    }
}

/// Declare the kernel's three streams. Idempotent; called at startup.
pub fn declare_streams<C: Clock>(bus: &Bus<C>) -> Result<(), BusError> {
    bus.create_or_update_stream(StreamPolicy::work(
        STREAM_WORK,
        &["jobs.dispatch", "tasks.*"],
    ))?;
    bus.create_or_update_stream(StreamPolicy::age_limited(
        STREAM_EVENTS,
        &["jobs.events", "workers.*", "audit.>", "events.*"],
        Duration::from_secs(90 * 24 * 3600),
    ))?;
    bus.create_or_update_stream(StreamPolicy::ephemeral(
        STREAM_LIVE,
        &["live.telemetry.>", "live.lifecycle.>"],
        Duration::from_secs(10),
    ))?;
    Ok(())
}

/// One message per task attempt on the work stream.
///
/// Consumers that cannot find the task row (a spurious publish after a
/// rolled-back plan) must ack and drop the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDispatch {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub input_url: String,
    pub output_url: String,
    pub profile: EncodeProfile,
    pub start_time: f64,
    pub duration: f64,
}

/// Worker-originated task state report on `jobs.events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub worker_id: WorkerId,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Claimed,
    Progress {
        percent: f64,
        #[serde(default)]
        speed: f64,
        #[serde(default)]
        fps: f64,
        #[serde(default)]
        bitrate: u64,
    },
    Completed {
        output_key: String,
        output_size: u64,
    },
    Failed {
        exit_code: i32,
        message: String,
    },
}

/// Kernel-originated job state fan-out on `jobs.events` (no task_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEventMsg {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Worker heartbeat on `workers.heartbeat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatMsg {
    pub worker_id: WorkerId,
    pub hostname: String,
    pub capabilities: WorkerCaps,
    pub timestamp_ms: u64,
}

/// Audit record on `audit.user_action` / `audit.system`.
///
/// Details must already be redacted; secret-reference fields never ride
/// the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: String,
    pub actor: String,
    pub resource_type: String,
    pub resource_id: String,
    pub correlation_id: String,
    pub at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
