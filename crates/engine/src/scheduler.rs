// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle: submission, decomposition, stitch/publish hand-off,
//! cancellation, retry.
//!
//! ```text
//! Queued ──(first-task-claimed)──▶ Processing
//! Processing ──(all-tasks-Completed)──▶ Stitching
//! Stitching ──(stitch-success)──▶ Publishing (if any targets) │ Completed
//! Publishing ──(all-targets-done)──▶ Completed
//! any ──(cancel)──▶ Cancelled   any ──(unrecoverable)──▶ Failed
//! ```

use crate::runtime::{Engine, EngineError, SubmitJob};
use crate::timer::requeue_key;
use crate::wire::{subjects, JobEventMsg, TaskDispatch};
use cf_core::{
    codes, Clock, ErrorKind, Event, Job, JobConfig, JobId, JobState, KernelError, Task, TaskStatus,
};
use cf_encoder::{build_plan, segment_output_key, stitch};
use tracing::{info, warn};

impl<C: Clock + 'static> Engine<C> {
    /// Accept a submission: create the job, decompose it, dispatch its
    /// tasks. Refused outright while the bus is down.
    ///
    /// Validation failures surface before a job row exists; later
    /// failures (probe, no encoder) mark the created job Failed and
    /// still return its ID so the submitter can inspect it.
    pub async fn submit_job(&self, submit: SubmitJob) -> Result<JobId, EngineError> {
        if !self.bus.is_available() {
            return Err(EngineError::BusUnavailable);
        }
        let profile = match (&submit.profile_inline, &submit.profile_name) {
            (Some(inline), _) => inline.clone(),
            (None, Some(name)) => self
                .config
                .profiles
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::UnknownProfile(name.clone()))?,
            (None, None) => cf_core::EncodeProfile::fallback(),
        };

        let job_id = JobId::new();
        let job = Job::new_with_epoch_ms(
            JobConfig::builder(job_id.to_string(), submit.source.clone())
                .owner(submit.owner.clone())
                .profile(profile)
                .publish_targets(submit.publish_targets.clone())
                .webhook_urls(submit.webhook_urls.clone())
                .build(),
            self.clock.epoch_ms(),
        );
        self.record(vec![Event::JobCreated { job: job.clone() }])?;
        self.audit(
            subjects::AUDIT_USER_ACTION,
            "job.create",
            &submit.owner,
            "job",
            job_id.as_str(),
            &cf_core::error::new_correlation_id(),
        );

        if let Err(e) = self.decompose(&job).await {
            let error = e.to_kernel(self.clock.epoch_ms());
            self.fail_job(job_id, error)?;
        }
        Ok(job_id)
    }

    /// Probe the source, plan segments, journal the batch atomically,
    /// then publish one dispatch per task.
    ///
    /// Persist-then-publish: a dispatch that fails to publish is
    /// repaired by the republish sweep; a dispatch without a task row
    /// (rolled-back plan) is acked and dropped by consumers.
    pub(crate) async fn decompose(&self, job: &Job) -> Result<(), EngineError> {
        let encoder = self
            .host
            .encoder_for(&job.profile.video_codec, job.profile.prefer_gpu)?;
        let probe = encoder.probe(&job.source.input_url()).await?;

        let healthy_workers = self.healthy_worker_count().max(1);
        let tasks = build_plan(job.id, &probe, &job.profile, &self.config.segment, healthy_workers)?;
        info!(job = %job.id, tasks = tasks.len(), workers = healthy_workers, "job decomposed");

        self.record(vec![Event::JobPlanned {
            job_id: job.id,
            source_duration: probe.duration_seconds,
            tasks: tasks.clone(),
        }])?;

        for task in &tasks {
            self.dispatch_task(job, task);
        }
        Ok(())
    }

    /// Publish one task attempt to the work stream (best-effort; the
    /// republish sweep repairs drops).
    pub(crate) fn dispatch_task(&self, job: &Job, task: &Task) {
        let dispatch = TaskDispatch {
            task_id: task.id,
            job_id: job.id,
            input_url: job.source.input_url(),
            output_url: format!(
                "fs://media/{}",
                segment_output_key(&job.id, task.index, &job.profile.container)
            ),
            profile: job.profile.clone(),
            start_time: task.start_time,
            duration: task.duration(),
        };
        match serde_json::to_value(&dispatch) {
            Ok(value) => {
                if let Err(e) = self.bus.publish(subjects::JOBS_DISPATCH, value) {
                    warn!(task = %task.id, error = %e, "dispatch publish failed, sweep will retry");
                }
            }
            Err(e) => warn!(task = %task.id, error = %e, "dispatch serialization failed"),
        }
    }

    /// All tasks Completed → Stitching. Returns the job ID when the
    /// caller must drive [`Engine::finish_job`].
    pub(crate) fn maybe_ready_to_finish(&self, job_id: JobId) -> Result<Option<JobId>, EngineError> {
        let ready = {
            let state = self.state.lock();
            let Some(job) = state.jobs.get(job_id.as_str()) else {
                return Ok(None);
            };
            let tasks = state.tasks_of(job_id.as_str());
            job.state == JobState::Processing
                && !tasks.is_empty()
                && tasks.iter().all(|t| t.status == TaskStatus::Completed)
        };
        if !ready {
            return Ok(None);
        }
        self.advance_job(job_id, JobState::Stitching)?;
        Ok(Some(job_id))
    }

    /// Drive a job from Stitching to its terminal success state. Safe to
    /// re-enter: anything but Stitching returns immediately.
    pub async fn finish_job(&self, job_id: JobId) -> Result<(), EngineError> {
        let (job, tasks) = {
            let state = self.state.lock();
            let Some(job) = state.jobs.get(job_id.as_str()) else {
                return Ok(());
            };
            if job.state != JobState::Stitching {
                return Ok(());
            }
            (job.clone(), state.tasks_of(job_id.as_str()).to_vec())
        };
        let token = self.cancel_token(&job_id);

        let encoder = self
            .host
            .encoder_for(&job.profile.video_codec, job.profile.prefer_gpu)?;
        let storage = self.host.storage_for_scheme("fs")?;

        let stitch_result = tokio::select! {
            r = stitch(encoder, storage, &job, &tasks) => r,
            _ = token.cancelled() => return Ok(()),
        };
        let (output_key, _url) = match stitch_result {
            Ok(ok) => ok,
            Err(e) => {
                let error = EngineError::from(e).to_kernel(self.clock.epoch_ms());
                self.fail_job(job_id, error)?;
                return Ok(());
            }
        };
        self.record(vec![Event::JobStitched { id: job_id, output_key }])?;

        if token.is_cancelled() {
            return Ok(());
        }

        if job.publish_targets.is_empty() {
            self.advance_job(job_id, JobState::Completed)?;
            self.drop_cancel_token(&job_id);
            return Ok(());
        }

        self.advance_job(job_id, JobState::Publishing)?;
        self.run_publishing(job_id, &token).await?;
        self.settle_publishing(job_id)?;
        self.drop_cancel_token(&job_id);
        Ok(())
    }

    /// All targets reached a terminal outcome: Completed unless every
    /// one of them failed.
    fn settle_publishing(&self, job_id: JobId) -> Result<(), EngineError> {
        let all_failed = {
            let state = self.state.lock();
            state
                .jobs
                .get(job_id.as_str())
                .is_some_and(|j| j.publishing_settled() && !j.any_publish_succeeded())
        };
        if all_failed {
            self.fail_job(
                job_id,
                KernelError::new(ErrorKind::Permanent, codes::PUBLISH_FAILED, "all publish targets failed")
                    .epoch_ms(self.clock.epoch_ms()),
            )?;
        } else {
            self.advance_job(job_id, JobState::Completed)?;
        }
        Ok(())
    }

    /// Crash recovery: re-enter jobs stranded mid-stitch or mid-publish.
    /// Both paths are idempotent, so re-entry has no side effects on
    /// work that already landed.
    pub async fn resume_unfinished(&self) -> Result<(), EngineError> {
        let (stitching, publishing): (Vec<JobId>, Vec<JobId>) = {
            let state = self.state.lock();
            (
                state
                    .jobs
                    .values()
                    .filter(|j| j.state == JobState::Stitching)
                    .map(|j| j.id)
                    .collect(),
                state
                    .jobs
                    .values()
                    .filter(|j| j.state == JobState::Publishing)
                    .map(|j| j.id)
                    .collect(),
            )
        };
        for job_id in stitching {
            info!(job = %job_id, "resuming interrupted stitch");
            self.finish_job(job_id).await?;
        }
        for job_id in publishing {
            info!(job = %job_id, "resuming interrupted publishing");
            let token = self.cancel_token(&job_id);
            self.run_publishing(job_id, &token).await?;
            self.settle_publishing(job_id)?;
            self.drop_cancel_token(&job_id);
        }
        Ok(())
    }

    /// Record a legal state transition and fan it out.
    pub(crate) fn advance_job(&self, job_id: JobId, next: JobState) -> Result<(), EngineError> {
        self.record(vec![Event::JobAdvanced {
            id: job_id,
            state: next,
            epoch_ms: self.clock.epoch_ms(),
        }])?;
        let job = self.state.lock().jobs.get(job_id.as_str()).cloned();
        if let Some(job) = job {
            self.fan_out_job_event(&job);
        }
        Ok(())
    }

    /// Terminal failure: journal it, signal in-flight workers, cancel
    /// pending retries. Late completions are still accepted; their
    /// artifacts age out with the retention window.
    pub(crate) fn fail_job(&self, job_id: JobId, error: KernelError) -> Result<(), EngineError> {
        let (in_flight, all_task_ids) = {
            let state = self.state.lock();
            let tasks = state.tasks_of(job_id.as_str());
            (
                tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::InFlight)
                    .map(|t| t.id)
                    .collect::<Vec<_>>(),
                tasks.iter().map(|t| t.id).collect::<Vec<_>>(),
            )
        };

        self.sink_error(&error);
        self.record(vec![Event::JobFailed {
            id: job_id,
            error,
            epoch_ms: self.clock.epoch_ms(),
        }])?;

        self.cancel_token(&job_id).cancel();
        {
            let mut timers = self.timers.lock();
            for task_id in &all_task_ids {
                timers.cancel(&requeue_key(task_id));
            }
        }
        for task_id in in_flight {
            self.publish_json(
                subjects::JOBS_EVENTS,
                &JobEventMsg {
                    job_id,
                    task_id: Some(task_id),
                    state: "cancel_requested".to_string(),
                    progress_pct: None,
                    error: None,
                },
            );
        }

        let job = self.state.lock().jobs.get(job_id.as_str()).cloned();
        if let Some(job) = job {
            self.fan_out_job_event(&job);
        }
        Ok(())
    }

    /// Cancel from any non-absorbing state. In-flight tasks get a
    /// cancellation signal; the state applier reverts them.
    pub fn cancel_job(&self, id: &str) -> Result<JobId, EngineError> {
        let (job_id, owner, in_flight, all_task_ids) = {
            let state = self.state.lock();
            let job = state.get_job(id).ok_or_else(|| EngineError::JobNotFound(id.to_string()))?;
            if job.is_terminal() {
                return Err(EngineError::Terminal(id.to_string()));
            }
            let tasks = state.tasks_of(job.id.as_str());
            (
                job.id,
                job.owner.clone(),
                tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::InFlight)
                    .map(|t| t.id)
                    .collect::<Vec<_>>(),
                tasks.iter().map(|t| t.id).collect::<Vec<_>>(),
            )
        };

        self.record(vec![Event::JobCancelled { id: job_id, epoch_ms: self.clock.epoch_ms() }])?;
        self.cancel_token(&job_id).cancel();
        self.drop_cancel_token(&job_id);
        {
            let mut timers = self.timers.lock();
            for task_id in &all_task_ids {
                timers.cancel(&requeue_key(task_id));
            }
        }
        for task_id in in_flight {
            self.publish_json(
                subjects::JOBS_EVENTS,
                &JobEventMsg {
                    job_id,
                    task_id: Some(task_id),
                    state: "cancel_requested".to_string(),
                    progress_pct: None,
                    error: None,
                },
            );
        }
        self.audit(
            subjects::AUDIT_USER_ACTION,
            "job.cancel",
            &owner,
            "job",
            job_id.as_str(),
            &cf_core::error::new_correlation_id(),
        );

        let job = self.state.lock().jobs.get(job_id.as_str()).cloned();
        if let Some(job) = job {
            self.fan_out_job_event(&job);
        }
        info!(job = %job_id, "job cancelled");
        Ok(job_id)
    }

    /// Retry = a fresh job with the same source, profile, and targets.
    pub async fn retry_job(&self, id: &str) -> Result<JobId, EngineError> {
        let submit = {
            let state = self.state.lock();
            let job = state.get_job(id).ok_or_else(|| EngineError::JobNotFound(id.to_string()))?;
            SubmitJob {
                owner: job.owner.clone(),
                source: job.source.clone(),
                profile_name: None,
                profile_inline: Some(job.profile.clone()),
                publish_targets: job.publish_targets.clone(),
                webhook_urls: job.webhook_urls.clone(),
            }
        };
        self.submit_job(submit).await
    }

    /// Output artifacts of a job: per-segment keys plus the stitched
    /// artifact when present.
    pub fn list_outputs(&self, id: &str) -> Result<Vec<(String, u64)>, EngineError> {
        let state = self.state.lock();
        let job = state.get_job(id).ok_or_else(|| EngineError::JobNotFound(id.to_string()))?;
        let mut outputs: Vec<(String, u64)> = state
            .tasks_of(job.id.as_str())
            .iter()
            .filter_map(|t| t.output_key.clone().map(|k| (k, t.output_size.unwrap_or(0))))
            .collect();
        if let Some(stitched) = &job.output_key {
            outputs.push((stitched.clone(), 0));
        }
        Ok(outputs)
    }

    /// Garbage-collect debug artifacts of failed/cancelled jobs whose
    /// retention window has lapsed. Deletion through the storage plugin
    /// is best-effort; the purge event is what clears the references.
    pub(crate) async fn gc_sweep(&self) -> Result<(), EngineError> {
        let now_ms = self.clock.epoch_ms();
        let retention = self.config.artifact_retention_ms;

        let expired: Vec<(JobId, Vec<String>)> = {
            let state = self.state.lock();
            state
                .jobs
                .values()
                .filter(|j| matches!(j.state, JobState::Failed | JobState::Cancelled))
                .filter(|j| {
                    j.finished_at_ms
                        .is_some_and(|t| now_ms.saturating_sub(t) >= retention)
                })
                .filter_map(|j| {
                    let mut keys: Vec<String> = state
                        .tasks_of(j.id.as_str())
                        .iter()
                        .filter_map(|t| t.output_key.clone())
                        .collect();
                    keys.extend(j.output_key.clone());
                    if keys.is_empty() {
                        None
                    } else {
                        Some((j.id, keys))
                    }
                })
                .collect()
        };
        if expired.is_empty() {
            return Ok(());
        }

        let storage = self.host.storage_for_scheme("fs").ok();
        for (job_id, keys) in expired {
            if let Some(storage) = &storage {
                for key in &keys {
                    if let Err(e) = storage.delete("media", key).await {
                        warn!(job = %job_id, key = %key, error = %e, "artifact delete failed");
                    }
                }
            }
            info!(job = %job_id, artifacts = keys.len(), "debug artifacts purged");
            self.record(vec![Event::JobArtifactsPurged { id: job_id, epoch_ms: now_ms }])?;
        }
        Ok(())
    }

    /// Republish dispatches for Pending tasks of live jobs. Consumers
    /// treat duplicates as no-ops, so the sweep can over-publish.
    pub fn republish_sweep(&self) {
        let pending: Vec<(Job, Task)> = {
            let state = self.state.lock();
            state
                .jobs
                .values()
                .filter(|j| matches!(j.state, JobState::Queued | JobState::Processing))
                .flat_map(|j| {
                    state
                        .tasks_of(j.id.as_str())
                        .iter()
                        .filter(|t| t.status == TaskStatus::Pending && !t.attempts_exhausted())
                        .map(|t| (j.clone(), t.clone()))
                        .collect::<Vec<_>>()
                })
                .collect()
        };
        for (job, task) in &pending {
            // A task waiting on its backoff timer keeps its schedule
            let waiting = self.timers.lock().contains(&requeue_key(&task.id));
            if !waiting {
                self.dispatch_task(job, task);
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
