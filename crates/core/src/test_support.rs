// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for other crates' tests (behind `test-support`).

use crate::job::{EncodeProfile, Job, JobConfig, JobSource};
use crate::task::Task;
use crate::worker::{Worker, WorkerCaps, WorkerId};

/// A queued job with a URL source and the fallback profile.
pub fn queued_job(id: &str) -> Job {
    Job::new_with_epoch_ms(
        JobConfig::builder(id, JobSource::Url { url: "https://cdn.example/in.mp4".to_string() })
            .owner("user-1")
            .build(),
        1_000_000,
    )
}

/// A contiguous task plan covering `[0, duration)` in equal spans.
pub fn equal_plan(job_id: &str, duration: f64, count: u32) -> Vec<Task> {
    let span = duration / count as f64;
    (0..count)
        .map(|i| {
            let start = i as f64 * span;
            let end = if i == count - 1 { duration } else { (i + 1) as f64 * span };
            Task::new(crate::job::JobId::from_string(job_id), i, start, end)
        })
        .collect()
}

/// A healthy worker with the given parallel budget.
pub fn worker(id: &str, budget: u32, heartbeat_ms: u64) -> Worker {
    Worker {
        id: WorkerId::new(id),
        hostname: format!("host-{id}"),
        caps: WorkerCaps {
            codecs: vec!["h264".to_string(), "hevc".to_string()],
            gpu: None,
            parallel_budget: budget,
        },
        last_heartbeat_ms: heartbeat_ms,
    }
}

/// A 720p profile distinct from the fallback, for override tests.
pub fn profile_720p() -> EncodeProfile {
    EncodeProfile {
        name: "720p_h264".to_string(),
        video_codec: "h264".to_string(),
        audio_codec: "aac".to_string(),
        bitrate: 3_000_000,
        width: 1280,
        height: 720,
        preset: "fast".to_string(),
        container: "mp4".to_string(),
        segment_target_secs: None,
        max_attempts: None,
        prefer_gpu: false,
    }
}
