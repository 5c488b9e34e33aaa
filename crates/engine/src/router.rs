// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task routing: claims, attempt accounting, retry backoff, worker-loss
//! reassignment.

use crate::runtime::{Engine, EngineError};
use crate::timer::{requeue_key, Wakeup};
use crate::wire::{subjects, HeartbeatMsg, JobEventMsg, TaskOutcome, TaskReport};
use cf_core::{
    Clock, Event, JobId, JobState, KernelError, Task, TaskId, TaskStatus, Worker, WorkerId,
};
use tracing::{debug, info, warn};

impl<C: Clock + 'static> Engine<C> {
    /// Upsert a worker record from its heartbeat.
    pub fn handle_heartbeat(&self, heartbeat: HeartbeatMsg) -> Result<(), EngineError> {
        self.record(vec![Event::WorkerSeen {
            worker: Worker {
                id: heartbeat.worker_id,
                hostname: heartbeat.hostname,
                caps: heartbeat.capabilities,
                last_heartbeat_ms: self.clock.epoch_ms(),
            },
        }])
    }

    /// Ingest a worker's task report. Returns a job ID when every task
    /// of the job just completed; the caller must then drive
    /// [`Engine::finish_job`].
    pub async fn handle_task_report(
        &self,
        report: TaskReport,
    ) -> Result<Option<JobId>, EngineError> {
        match report.outcome {
            TaskOutcome::Claimed => {
                self.handle_claim(report.job_id, report.task_id, report.worker_id)?;
                Ok(None)
            }
            TaskOutcome::Progress { percent, .. } => {
                self.handle_progress(report.job_id, report.task_id, percent)?;
                Ok(None)
            }
            TaskOutcome::Completed { output_key, output_size } => self.handle_completion(
                report.job_id,
                report.task_id,
                report.worker_id,
                output_key,
                output_size,
            ),
            TaskOutcome::Failed { exit_code, message } => {
                self.handle_failure(report.job_id, report.task_id, exit_code, &message)?;
                Ok(None)
            }
        }
    }

    /// Claim: atomically `(InFlight, worker, attempt+1)`. Claims against
    /// terminal jobs, non-Pending tasks, exhausted budgets, or
    /// over-budget workers are refused (the worker drops the dispatch).
    fn handle_claim(
        &self,
        job_id: JobId,
        task_id: TaskId,
        worker_id: WorkerId,
    ) -> Result<(), EngineError> {
        let accept = {
            let state = self.state.lock();
            let Some(job) = state.jobs.get(job_id.as_str()) else {
                debug!(task = %task_id, "claim for unknown job dropped");
                return Ok(());
            };
            if job.is_terminal() {
                debug!(task = %task_id, "claim against terminal job dropped");
                return Ok(());
            }
            let Some(task) = state.tasks_of(job_id.as_str()).iter().find(|t| t.id == task_id)
            else {
                debug!(task = %task_id, "claim for unknown task dropped (spurious dispatch)");
                return Ok(());
            };
            if task.status != TaskStatus::Pending || task.attempts_exhausted() {
                debug!(task = %task_id, status = %task.status, "claim refused");
                return Ok(());
            }

            // Per-worker in-flight budget from the declared capability
            let budget = state
                .workers
                .get(worker_id.as_str())
                .map_or(1, |w| w.caps.parallel_budget.max(1)) as usize;
            let in_flight = state
                .tasks
                .values()
                .flatten()
                .filter(|t| {
                    t.status == TaskStatus::InFlight
                        && t.assigned_worker.as_ref() == Some(&worker_id)
                })
                .count();
            if in_flight >= budget {
                warn!(worker = %worker_id, budget, "claim over budget refused");
                false
            } else {
                true
            }
        };
        if !accept {
            return Ok(());
        }

        let epoch_ms = self.clock.epoch_ms();
        self.activity.lock().insert(task_id.to_string(), epoch_ms);
        let mut events = vec![Event::TaskClaimed { task_id, job_id, worker_id, epoch_ms }];
        let first_claim = {
            let state = self.state.lock();
            state.jobs.get(job_id.as_str()).is_some_and(|j| j.state == JobState::Queued)
        };
        if first_claim {
            events.push(Event::JobAdvanced { id: job_id, state: JobState::Processing, epoch_ms });
        }
        self.record(events)?;

        let job = self.state.lock().jobs.get(job_id.as_str()).cloned();
        if let Some(job) = job {
            self.fan_out_job_event(&job);
        }
        Ok(())
    }

    /// Progress hint: transient event plus derived job progress/ETA.
    fn handle_progress(
        &self,
        job_id: JobId,
        task_id: TaskId,
        percent: f64,
    ) -> Result<(), EngineError> {
        self.record(vec![Event::TaskProgressed { task_id, job_id, percent }])?;

        let now_ms = self.clock.epoch_ms();
        self.activity.lock().insert(task_id.to_string(), now_ms);
        let snapshot = {
            let mut state = self.state.lock();
            let elapsed_secs = state
                .jobs
                .get(job_id.as_str())
                .and_then(|j| j.started_at_ms)
                .map_or(0.0, |t0| now_ms.saturating_sub(t0) as f64 / 1000.0);
            let tasks: Vec<Task> = state.tasks_of(job_id.as_str()).to_vec();
            if let Some(job) = state.jobs.get_mut(job_id.as_str()) {
                let refs: Vec<&Task> = tasks.iter().collect();
                job.update_progress(&refs, elapsed_secs);
                Some((job.clone(), task_id))
            } else {
                None
            }
        };
        if let Some((job, task_id)) = snapshot {
            self.publish_json(
                subjects::JOBS_EVENTS,
                &JobEventMsg {
                    job_id: job.id,
                    task_id: Some(task_id),
                    state: job.state.to_string(),
                    progress_pct: Some(job.progress_pct),
                    error: None,
                },
            );
        }
        Ok(())
    }

    /// Successful attempt. A late completion after job failure or
    /// cancellation is accepted and recorded; the artifact ages out with
    /// the retention window instead of being deleted inline.
    fn handle_completion(
        &self,
        job_id: JobId,
        task_id: TaskId,
        worker_id: WorkerId,
        output_key: String,
        output_size: u64,
    ) -> Result<Option<JobId>, EngineError> {
        let epoch_ms = self.clock.epoch_ms();
        self.record(vec![Event::TaskCompleted {
            task_id,
            job_id,
            worker_id,
            output_key: output_key.clone(),
            output_size,
            epoch_ms,
        }])?;
        self.timers.lock().cancel(&requeue_key(&task_id));
        self.activity.lock().remove(task_id.as_str());

        let terminal = {
            let state = self.state.lock();
            state.jobs.get(job_id.as_str()).is_none_or(|j| j.is_terminal())
        };
        if terminal {
            info!(task = %task_id, key = %output_key, "late completion, artifact queued for GC");
            return Ok(None);
        }
        self.maybe_ready_to_finish(job_id)
    }

    /// Failed attempt: retriable failures requeue after backoff until
    /// the attempt budget runs out; permanent failures (and exhaustion)
    /// fail the job.
    fn handle_failure(
        &self,
        job_id: JobId,
        task_id: TaskId,
        exit_code: i32,
        message: &str,
    ) -> Result<(), EngineError> {
        let epoch_ms = self.clock.epoch_ms();
        self.activity.lock().remove(task_id.as_str());
        let error = KernelError::from_exit_code(exit_code, message.to_string()).epoch_ms(epoch_ms);
        let retriable = error.is_retriable();
        self.record(vec![Event::TaskFailed {
            task_id,
            job_id,
            error: error.clone(),
            epoch_ms,
        }])?;

        let (exhausted, attempt_count, job_terminal) = {
            let state = self.state.lock();
            let task = state.tasks_of(job_id.as_str()).iter().find(|t| t.id == task_id);
            let job_terminal =
                state.jobs.get(job_id.as_str()).is_none_or(|j| j.is_terminal());
            match task {
                Some(t) => (t.attempts_exhausted(), t.attempt_count, job_terminal),
                None => return Ok(()),
            }
        };
        if job_terminal {
            return Ok(());
        }

        if retriable && !exhausted {
            let delay = self.config.task_backoff.delay(attempt_count);
            debug!(task = %task_id, attempt = attempt_count, delay_ms = delay.as_millis() as u64, "requeue scheduled");
            self.timers.lock().set(
                requeue_key(&task_id),
                Wakeup::RequeueTask { job_id, task_id },
                delay,
                self.clock.now(),
            );
        } else {
            let job_error = KernelError::new(
                cf_core::ErrorKind::Permanent,
                cf_core::codes::JOB_ATTEMPTS_EXHAUSTED,
                format!("task {task_id} failed: {error}"),
            )
            .epoch_ms(epoch_ms)
            .correlation_id(error.correlation_id.clone());
            self.fail_job(job_id, job_error)?;
        }
        Ok(())
    }

    /// Backoff elapsed: put the task back on the queue.
    pub(crate) fn requeue_task(&self, job_id: JobId, task_id: TaskId) -> Result<(), EngineError> {
        let eligible = {
            let state = self.state.lock();
            let job_live = state
                .jobs
                .get(job_id.as_str())
                .is_some_and(|j| !j.is_terminal());
            let task_failed = state
                .tasks_of(job_id.as_str())
                .iter()
                .any(|t| t.id == task_id && t.status == TaskStatus::Failed);
            job_live && task_failed
        };
        if !eligible {
            return Ok(());
        }

        self.record(vec![Event::TaskRequeued {
            task_id,
            job_id,
            epoch_ms: self.clock.epoch_ms(),
        }])?;

        let pair = {
            let state = self.state.lock();
            state.jobs.get(job_id.as_str()).cloned().and_then(|job| {
                state
                    .tasks_of(job_id.as_str())
                    .iter()
                    .find(|t| t.id == task_id)
                    .cloned()
                    .map(|task| (job, task))
            })
        };
        if let Some((job, task)) = pair {
            self.dispatch_task(&job, &task);
        }
        Ok(())
    }

    /// Keepalive watchdog: an in-flight task that has not reported
    /// within the window is treated as a timeout (exit 255) and goes
    /// through the normal transient-retry path.
    pub fn stuck_sweep(&self) -> Result<(), EngineError> {
        let now_ms = self.clock.epoch_ms();
        let keepalive = self.config.progress_keepalive_ms;

        let last_seen = self.activity.lock().clone();
        let stuck: Vec<(JobId, TaskId)> = {
            let state = self.state.lock();
            state
                .tasks
                .iter()
                .filter(|(job_key, _)| {
                    state.jobs.get(*job_key).is_some_and(|j| !j.is_terminal())
                })
                .flat_map(|(_, tasks)| tasks.iter())
                .filter(|t| t.status == TaskStatus::InFlight)
                .filter(|t| {
                    last_seen
                        .get(t.id.as_str())
                        .is_none_or(|last| now_ms.saturating_sub(*last) >= keepalive)
                })
                .map(|t| (t.job_id, t.id))
                .collect()
        };
        for (job_id, task_id) in stuck {
            warn!(task = %task_id, "progress keepalive missed, treating as stuck");
            self.handle_failure(job_id, task_id, 255, "progress keepalive missed")?;
        }
        Ok(())
    }

    /// Heartbeat sweep: workers past the timeout lose their in-flight
    /// tasks back to Pending (no attempt consumed) and the dispatches
    /// are republished.
    pub fn heartbeat_sweep(&self) -> Result<(), EngineError> {
        let now_ms = self.clock.epoch_ms();
        let timeout = self.config.heartbeat_timeout_ms;

        let lost_workers: Vec<WorkerId> = {
            let state = self.state.lock();
            state
                .workers
                .values()
                .filter(|w| w.last_heartbeat_ms != 0 && !w.is_healthy(now_ms, timeout))
                .map(|w| w.id.clone())
                .collect()
        };
        if lost_workers.is_empty() {
            return Ok(());
        }

        let mut events = Vec::new();
        let mut to_redispatch: Vec<(JobId, TaskId)> = Vec::new();
        {
            let state = self.state.lock();
            for worker_id in &lost_workers {
                warn!(worker = %worker_id, "worker heartbeat lost");
                events.push(Event::WorkerLost { worker_id: worker_id.clone(), epoch_ms: now_ms });
                for (job_key, tasks) in &state.tasks {
                    let job_live = state.jobs.get(job_key).is_some_and(|j| !j.is_terminal());
                    if !job_live {
                        continue;
                    }
                    for task in tasks {
                        if task.status == TaskStatus::InFlight
                            && task.assigned_worker.as_ref() == Some(worker_id)
                        {
                            events.push(Event::TaskReverted {
                                task_id: task.id,
                                job_id: task.job_id,
                                epoch_ms: now_ms,
                            });
                            to_redispatch.push((task.job_id, task.id));
                        }
                    }
                }
            }
        }
        self.record(events)?;

        for (job_id, task_id) in to_redispatch {
            let pair = {
                let state = self.state.lock();
                state.jobs.get(job_id.as_str()).cloned().and_then(|job| {
                    state
                        .tasks_of(job_id.as_str())
                        .iter()
                        .find(|t| t.id == task_id)
                        .cloned()
                        .map(|task| (job, task))
                })
            };
            if let Some((job, task)) = pair {
                self.dispatch_task(&job, &task);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
