// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decompose and stitch.
//!
//! Decomposition turns a probe into a validated task batch; stitching
//! turns completed segment outputs into one artifact via the concat
//! demuxer with `copy` codecs (no re-encode) and progressive-playback
//! metadata on the container.

use crate::concat::build_concat_list;
use crate::segment::{plan_segments, SegmentConfig};
use cf_core::{validate_plan, EncodeProfile, Job, JobId, PlanError, Task};
use cf_plugin::contracts::{EncoderPlugin, MediaProbe, PluginError, StoragePlugin, TaskSpec};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("source has no duration")]
    EmptySource,
    #[error("segment plan invalid: {0}")]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error("concat list: {0}")]
    Concat(#[from] crate::concat::ConcatError),
    #[error("stitch ended without a completion event")]
    StitchIncomplete,
    #[error("task {0} has no output recorded")]
    MissingOutput(String),
}

/// Build the task batch for a job from its probe.
///
/// Segment boundaries follow the keyframe planner; the profile may
/// override the target duration and attempt cap. The batch is validated
/// against the coverage invariant before it is handed back.
pub fn build_plan(
    job_id: JobId,
    probe: &MediaProbe,
    profile: &EncodeProfile,
    config: &SegmentConfig,
    healthy_workers: usize,
) -> Result<Vec<Task>, DriverError> {
    if probe.duration_seconds <= 0.0 {
        return Err(DriverError::EmptySource);
    }
    let config = match profile.segment_target_secs {
        Some(target) => SegmentConfig { target_secs: target, ..*config },
        None => *config,
    };

    let segments = plan_segments(&probe.keyframes, probe.duration_seconds, &config, healthy_workers);
    let max_attempts = profile.max_attempts.unwrap_or(cf_core::retry::DEFAULT_MAX_ATTEMPTS);
    let tasks: Vec<Task> = segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            Task::new(job_id, i as u32, segment.start, segment.end).with_max_attempts(max_attempts)
        })
        .collect();

    validate_plan(&tasks, probe.duration_seconds)?;
    debug!(job = %job_id, tasks = tasks.len(), duration = probe.duration_seconds, "plan built");
    Ok(tasks)
}

/// Object key for a segment output.
pub fn segment_output_key(job_id: &JobId, index: u32, container: &str) -> String {
    format!("outputs/{job_id}/seg{index:04}.{container}")
}

/// Object key for the stitched artifact.
pub fn stitch_output_key(job_id: &JobId, container: &str) -> String {
    format!("outputs/{job_id}/stitched.{container}")
}

/// Stitch a job's completed segment outputs into one artifact.
///
/// Emits the concat list in sequence-index order, drives the encoder
/// with `copy` codec contracts for both streams and faststart container
/// flags, and resolves the artifact URL through the storage plugin.
/// Returns `(output_key, artifact_url)`.
pub async fn stitch(
    encoder: Arc<dyn EncoderPlugin>,
    storage: Arc<dyn StoragePlugin>,
    job: &Job,
    tasks: &[Task],
) -> Result<(String, String), DriverError> {
    let mut ordered: Vec<&Task> = tasks.iter().collect();
    ordered.sort_by_key(|t| t.index);

    let mut paths = Vec::with_capacity(ordered.len());
    for task in &ordered {
        let key = task
            .output_key
            .as_deref()
            .ok_or_else(|| DriverError::MissingOutput(task.id.to_string()))?;
        paths.push(key.to_string());
    }
    let concat_list = build_concat_list(&paths)?;

    let output_key = stitch_output_key(&job.id, &job.profile.container);
    let mut copy_profile = job.profile.clone();
    copy_profile.video_codec = "copy".to_string();
    copy_profile.audio_codec = "copy".to_string();

    let spec = TaskSpec {
        task_id: format!("{}-stitch", job.id),
        input_url: String::new(),
        output_url: format!("fs://media/{output_key}"),
        profile: copy_profile,
        start_time: 0.0,
        duration: job.source_duration.unwrap_or(0.0),
        concat_list: Some(concat_list),
    };

    let mut rx = encoder.transcode(spec).await?;
    let mut completed = false;
    while let Some(progress) = rx.recv().await {
        if progress.completed {
            completed = true;
        }
    }
    if !completed {
        return Err(DriverError::StitchIncomplete);
    }

    let url = storage.get_url("media", &output_key).await?;
    info!(job = %job.id, key = %output_key, "stitched artifact ready");
    Ok((output_key, url))
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
