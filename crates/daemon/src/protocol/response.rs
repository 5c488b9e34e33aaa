// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use cf_core::{JobState, KernelError, PluginHealth, PluginType, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response from the daemon to a façade client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Pong,

    Ok,

    /// Structured failure; the error carries its machine code and
    /// correlation ID.
    Error { error: KernelError },

    Status {
        started_at_utc: String,
        uptime_secs: u64,
        jobs: usize,
        streams: usize,
        healthy_workers: usize,
        plugins: Vec<PluginStatusEntry>,
    },

    JobCreated { id: String },

    Job { job: JobDetail },

    Jobs { jobs: Vec<JobSummary> },

    Outputs { outputs: Vec<OutputEntry> },

    Published { platform_id: String, url: String },

    StreamCreated {
        id: String,
        /// Handed to the owner exactly once; never logged.
        stream_key: String,
        ingest_url: String,
    },

    Streams { streams: Vec<StreamSummary> },

    Stream { stream: StreamDetail },

    /// Archive VOD job, when one was synthesized
    StreamEnded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        archive_job_id: Option<String>,
    },

    IngestDecision { allowed: bool },

    Identity {
        valid: bool,
        user_id: String,
        username: String,
        role: String,
        roles: Vec<String>,
    },

    AuthzDecision { allowed: bool, reason: String },

    Browse { entries: Vec<BrowseEntryDto> },

    UploadUrl {
        url: String,
        headers: HashMap<String, String>,
        expires_at_ms: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub id: String,
    pub state: JobState,
    pub progress_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub created_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDetail {
    pub id: String,
    pub owner: String,
    pub state: JobState,
    pub progress_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<KernelError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    pub tasks: Vec<TaskDetail>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDetail {
    pub id: String,
    pub index: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub status: TaskStatus,
    pub attempt_count: u32,
    pub progress_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputEntry {
    pub key: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamSummary {
    pub id: String,
    pub title: String,
    pub is_live: bool,
    pub viewers: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamDetail {
    pub id: String,
    pub owner: String,
    pub title: String,
    pub is_live: bool,
    pub viewers: u64,
    pub total_viewers: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    pub archive_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_job_id: Option<String>,
    pub restreams: Vec<RestreamDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestreamDto {
    pub platform: String,
    pub ingest_url: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginStatusEntry {
    pub id: String,
    pub plugin_type: PluginType,
    pub health: PluginHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowseEntryDto {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub is_media: bool,
}
