// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and state machine.
//!
//! A job is a user-submitted request to produce output artifacts from a
//! source. State advances monotonically through the pipeline; the only
//! back-edges allowed are the explicit transitions into the absorbing
//! terminals `Failed` and `Cancelled`.

use crate::clock::Clock;
use crate::error::KernelError;
use crate::stream::StreamId;
use crate::task::Task;
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a job.
    ///
    /// Referenced by tasks, dispatch records, progress events, and audit
    /// entries; stable for the lifetime of the job row.
    pub struct JobId("job-");
}

/// Job lifecycle states.
///
/// ```text
/// Queued ──▶ Processing ──▶ Stitching ──▶ Publishing ──▶ Completed
///                               └──────────(no targets)──▶ Completed
/// any non-terminal ──▶ Cancelled | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Stitching,
    Publishing,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    JobState {
        Queued => "queued",
        Processing => "processing",
        Stitching => "stitching",
        Publishing => "publishing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    /// Whether `self → next` is a legal transition.
    ///
    /// Re-entering the current state is legal (idempotent crash recovery);
    /// terminal states accept nothing.
    pub fn can_transition(&self, next: JobState) -> bool {
        use JobState::*;
        if self.is_terminal() {
            return false;
        }
        if *self == next {
            return true;
        }
        match (*self, next) {
            (_, Cancelled) | (_, Failed) => true,
            (Queued, Processing) => true,
            (Processing, Stitching) => true,
            (Stitching, Publishing) | (Stitching, Completed) => true,
            (Publishing, Completed) => true,
            _ => false,
        }
    }
}

/// Where the job's input comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobSource {
    /// Remote URL fetched through the matching storage plugin.
    Url { url: String },
    /// Object already in managed storage.
    Object { bucket: String, key: String },
    /// Recorded segments of an ended live stream (archival VOD).
    Stream { stream_id: StreamId },
    /// Output artifact of an upstream job.
    Job { job_id: JobId },
}

impl JobSource {
    /// URL handed to workers as the task input.
    pub fn input_url(&self) -> String {
        match self {
            JobSource::Url { url } => url.clone(),
            JobSource::Object { bucket, key } => format!("fs://{bucket}/{key}"),
            JobSource::Stream { stream_id } => format!("fs://recordings/{stream_id}"),
            JobSource::Job { job_id } => format!("fs://outputs/{job_id}"),
        }
    }
}

/// Named encoding configuration plus optional per-job overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeProfile {
    pub name: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
    pub preset: String,
    pub container: String,
    /// Override: target segment duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_target_secs: Option<f64>,
    /// Override: per-task attempt cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Prefer hardware-accelerated encoder instances.
    #[serde(default)]
    pub prefer_gpu: bool,
}

impl EncodeProfile {
    /// Reasonable 1080p H.264 profile used when a submission names no profile.
    pub fn fallback() -> Self {
        Self {
            name: "1080p_h264".to_string(),
            video_codec: "h264".to_string(),
            audio_codec: "aac".to_string(),
            bitrate: 6_000_000,
            width: 1920,
            height: 1080,
            preset: "medium".to_string(),
            container: "mp4".to_string(),
            segment_target_secs: None,
            max_attempts: None,
            prefer_gpu: false,
        }
    }
}

/// One external publication destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishTarget {
    pub platform: String,
    pub privacy: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Opaque secret reference; resolved by the publisher plugin, never
    /// by the kernel.
    pub credentials_ref: String,
}

/// Outcome of publishing to a single target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishStatus {
    Pending,
    Published { platform_id: String, url: String },
    Failed { error: KernelError },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub platform: String,
    pub status: PublishStatus,
    pub attempts: u32,
}

/// Configuration for creating a new job
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub id: String,
    pub owner: String,
    pub source: JobSource,
    pub profile: EncodeProfile,
    pub publish_targets: Vec<PublishTarget>,
    pub webhook_urls: Vec<String>,
}

impl JobConfig {
    pub fn builder(id: impl Into<String>, source: JobSource) -> JobConfigBuilder {
        JobConfigBuilder {
            id: id.into(),
            owner: String::new(),
            source,
            profile: EncodeProfile::fallback(),
            publish_targets: Vec::new(),
            webhook_urls: Vec::new(),
        }
    }
}

pub struct JobConfigBuilder {
    id: String,
    owner: String,
    source: JobSource,
    profile: EncodeProfile,
    publish_targets: Vec<PublishTarget>,
    webhook_urls: Vec<String>,
}

impl JobConfigBuilder {
    crate::setters! {
        into {
            owner: String,
        }
        set {
            profile: EncodeProfile,
            publish_targets: Vec<PublishTarget>,
            webhook_urls: Vec<String>,
        }
    }

    pub fn build(self) -> JobConfig {
        JobConfig {
            id: self.id,
            owner: self.owner,
            source: self.source,
            profile: self.profile,
            publish_targets: self.publish_targets,
            webhook_urls: self.webhook_urls,
        }
    }
}

/// A job instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: String,
    pub source: JobSource,
    pub profile: EncodeProfile,
    pub publish_targets: Vec<PublishTarget>,
    #[serde(default)]
    pub publish_outcomes: Vec<PublishOutcome>,
    pub state: JobState,
    /// Aggregate of task percents; preserved on failure for debugging.
    #[serde(default)]
    pub progress_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<KernelError>,
    /// Hint only; authoritative assignment lives on each task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_hint: Option<WorkerId>,
    /// Source duration learned at decomposition time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_duration: Option<f64>,
    /// Object key of the stitched artifact once stitching succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(default)]
    pub webhook_urls: Vec<String>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(config: JobConfig, clock: &impl Clock) -> Self {
        Self::new_with_epoch_ms(config, clock.epoch_ms())
    }

    /// Create a new queued job with explicit epoch_ms (for WAL replay).
    pub fn new_with_epoch_ms(config: JobConfig, epoch_ms: u64) -> Self {
        let publish_outcomes = config
            .publish_targets
            .iter()
            .map(|t| PublishOutcome {
                platform: t.platform.clone(),
                status: PublishStatus::Pending,
                attempts: 0,
            })
            .collect();
        Self {
            id: JobId::from_string(&config.id),
            owner: config.owner,
            source: config.source,
            profile: config.profile,
            publish_targets: config.publish_targets,
            publish_outcomes,
            state: JobState::Queued,
            progress_pct: 0.0,
            eta_seconds: None,
            error: None,
            worker_hint: None,
            source_duration: None,
            output_key: None,
            webhook_urls: config.webhook_urls,
            created_at_ms: epoch_ms,
            started_at_ms: None,
            finished_at_ms: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Advance the state machine. Illegal transitions are rejected; a
    /// re-entry of the current state is accepted without side effects.
    pub fn advance(&mut self, next: JobState, epoch_ms: u64) -> Result<(), IllegalTransition> {
        if !self.state.can_transition(next) {
            return Err(IllegalTransition { from: self.state, to: next });
        }
        if self.state == next {
            return Ok(());
        }
        if next == JobState::Processing && self.started_at_ms.is_none() {
            self.started_at_ms = Some(epoch_ms);
        }
        if next.is_terminal() {
            self.finished_at_ms = Some(epoch_ms);
        }
        if next == JobState::Completed {
            self.progress_pct = 100.0;
            self.eta_seconds = Some(0);
        }
        self.state = next;
        Ok(())
    }

    /// Recompute the aggregate progress from the job's tasks.
    ///
    /// Pending contributes 0, in-flight its last reported percent,
    /// completed 100. The aggregate never regresses.
    pub fn update_progress(&mut self, tasks: &[&Task], elapsed_secs: f64) {
        let pct = aggregate_progress(tasks);
        if pct > self.progress_pct {
            self.progress_pct = pct;
        }
        self.eta_seconds = eta_seconds(elapsed_secs, self.progress_pct);
    }

    /// Record a publish outcome for a single target platform. Ad-hoc
    /// publishes (post-completion, platform not in the original list)
    /// append a row.
    pub fn record_publish_outcome(&mut self, platform: &str, status: PublishStatus, attempts: u32) {
        match self
            .publish_outcomes
            .iter_mut()
            .find(|o| o.platform == platform)
        {
            Some(outcome) => {
                outcome.status = status;
                outcome.attempts = attempts;
            }
            None => self.publish_outcomes.push(PublishOutcome {
                platform: platform.to_string(),
                status,
                attempts,
            }),
        }
    }

    /// True once every publish target has reached a terminal outcome.
    pub fn publishing_settled(&self) -> bool {
        self.publish_outcomes
            .iter()
            .all(|o| !matches!(o.status, PublishStatus::Pending))
    }

    /// True if at least one target published (partial failure still
    /// counts as an overall success).
    pub fn any_publish_succeeded(&self) -> bool {
        self.publish_outcomes
            .iter()
            .any(|o| matches!(o.status, PublishStatus::Published { .. }))
    }
}

/// Attempted an edge the state machine does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: JobState,
    pub to: JobState,
}

/// Average of task percents: Pending 0, InFlight last report, Completed 100.
pub fn aggregate_progress(tasks: &[&Task]) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }
    let sum: f64 = tasks.iter().map(|t| t.contribution_pct()).sum();
    sum / tasks.len() as f64
}

/// `elapsed × (100 − progress) / max(progress, ε)`, rounded to whole seconds.
pub fn eta_seconds(elapsed_secs: f64, progress_pct: f64) -> Option<u64> {
    if progress_pct <= 0.0 {
        return None;
    }
    let p = progress_pct.min(100.0);
    let eta = elapsed_secs * (100.0 - p) / p.max(1e-9);
    Some(eta.round() as u64)
}

/// Map of profile name → profile, loaded from kernel configuration.
pub type ProfileCatalog = HashMap<String, EncodeProfile>;

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            owner: String = "user-1",
        }
        set {
            id: JobId = JobId::from_string("job-test-1"),
            source: JobSource = JobSource::Url { url: "https://example.com/in.mp4".to_string() },
            profile: EncodeProfile = EncodeProfile::fallback(),
            publish_targets: Vec<PublishTarget> = Vec::new(),
            publish_outcomes: Vec<PublishOutcome> = Vec::new(),
            state: JobState = JobState::Queued,
            progress_pct: f64 = 0.0,
            webhook_urls: Vec<String> = Vec::new(),
            created_at_ms: u64 = 1_000_000,
        }
        option {
            eta_seconds: u64 = None,
            error: KernelError = None,
            worker_hint: WorkerId = None,
            source_duration: f64 = None,
            output_key: String = None,
            started_at_ms: u64 = None,
            finished_at_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
