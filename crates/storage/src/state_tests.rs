// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cf_core::test_support::{equal_plan, queued_job, worker};
use cf_core::{
    codes, ErrorKind, Event, JobId, JobState, KernelError, LiveStream, RestreamTarget, StreamId,
    TaskId, TaskStatus, WorkerId,
};

fn planned_state(job_id: &str, segments: u32) -> MaterializedState {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::JobCreated { job: queued_job(job_id) });
    state.apply_event(&Event::JobPlanned {
        job_id: JobId::from_string(job_id),
        source_duration: 120.0,
        tasks: equal_plan(job_id, 120.0, segments),
    });
    state
}

fn task_id(state: &MaterializedState, job_id: &str, index: usize) -> TaskId {
    state.tasks_of(job_id)[index].id
}

#[test]
fn job_created_then_planned() {
    let state = planned_state("job-1", 4);
    assert_eq!(state.jobs["job-1"].state, JobState::Queued);
    assert_eq!(state.jobs["job-1"].source_duration, Some(120.0));
    assert_eq!(state.tasks_of("job-1").len(), 4);
}

#[test]
fn replayed_create_does_not_clobber() {
    let mut state = planned_state("job-1", 2);
    state
        .jobs
        .get_mut("job-1")
        .unwrap()
        .advance(JobState::Processing, 5)
        .unwrap();

    state.apply_event(&Event::JobCreated { job: queued_job("job-1") });
    assert_eq!(state.jobs["job-1"].state, JobState::Processing);

    state.apply_event(&Event::JobPlanned {
        job_id: JobId::from_string("job-1"),
        source_duration: 120.0,
        tasks: equal_plan("job-1", 120.0, 7),
    });
    // Original plan wins
    assert_eq!(state.tasks_of("job-1").len(), 2);
}

#[test]
fn claim_is_idempotent_under_replay() {
    let mut state = planned_state("job-1", 2);
    let tid = task_id(&state, "job-1", 0);
    let claim = Event::TaskClaimed {
        task_id: tid,
        job_id: JobId::from_string("job-1"),
        worker_id: WorkerId::new("w1"),
        epoch_ms: 10,
    };
    state.apply_event(&claim);
    state.apply_event(&claim);

    let task = &state.tasks_of("job-1")[0];
    assert_eq!(task.status, TaskStatus::InFlight);
    assert_eq!(task.attempt_count, 1);
    assert_eq!(state.jobs["job-1"].worker_hint.as_ref().map(|w| w.as_str()), Some("w1"));
}

#[test]
fn complete_failed_requeue_cycle() {
    let mut state = planned_state("job-1", 2);
    let tid = task_id(&state, "job-1", 0);
    let job_id = JobId::from_string("job-1");

    state.apply_event(&Event::TaskClaimed {
        task_id: tid,
        job_id,
        worker_id: WorkerId::new("w1"),
        epoch_ms: 10,
    });
    state.apply_event(&Event::TaskFailed {
        task_id: tid,
        job_id,
        error: KernelError::from_exit_code(1, "exit 1"),
        epoch_ms: 11,
    });
    assert_eq!(state.tasks_of("job-1")[0].status, TaskStatus::Failed);

    state.apply_event(&Event::TaskRequeued { task_id: tid, job_id, epoch_ms: 16 });
    let task = &state.tasks_of("job-1")[0];
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.attempt_count, 1);

    state.apply_event(&Event::TaskClaimed {
        task_id: tid,
        job_id,
        worker_id: WorkerId::new("w2"),
        epoch_ms: 20,
    });
    state.apply_event(&Event::TaskCompleted {
        task_id: tid,
        job_id,
        worker_id: WorkerId::new("w2"),
        output_key: "out/seg0.ts".into(),
        output_size: 9000,
        epoch_ms: 30,
    });
    let task = &state.tasks_of("job-1")[0];
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.attempt_count, 2);
}

#[test]
fn revert_refunds_attempt_on_worker_loss() {
    let mut state = planned_state("job-1", 1);
    let tid = task_id(&state, "job-1", 0);
    let job_id = JobId::from_string("job-1");

    state.apply_event(&Event::TaskClaimed {
        task_id: tid,
        job_id,
        worker_id: WorkerId::new("w1"),
        epoch_ms: 10,
    });
    state.apply_event(&Event::TaskReverted { task_id: tid, job_id, epoch_ms: 60 });

    let task = &state.tasks_of("job-1")[0];
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.attempt_count, 0);
    assert!(task.assigned_worker.is_none());
}

#[test]
fn job_failed_records_error() {
    let mut state = planned_state("job-1", 1);
    state.apply_event(&Event::JobAdvanced {
        id: JobId::from_string("job-1"),
        state: JobState::Processing,
        epoch_ms: 5,
    });
    state.apply_event(&Event::JobFailed {
        id: JobId::from_string("job-1"),
        error: KernelError::new(ErrorKind::Permanent, codes::TASK_CORRUPT_INPUT, "exit 69"),
        epoch_ms: 9,
    });

    let job = &state.jobs["job-1"];
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.error.as_ref().map(|e| e.code.as_str()), Some("TASK-004"));
    assert_eq!(job.finished_at_ms, Some(9));
}

#[test]
fn cancel_reverts_in_flight_tasks() {
    let mut state = planned_state("job-1", 2);
    let tid = task_id(&state, "job-1", 0);
    let job_id = JobId::from_string("job-1");

    state.apply_event(&Event::JobAdvanced { id: job_id, state: JobState::Processing, epoch_ms: 5 });
    state.apply_event(&Event::TaskClaimed {
        task_id: tid,
        job_id,
        worker_id: WorkerId::new("w1"),
        epoch_ms: 10,
    });
    state.apply_event(&Event::JobCancelled { id: job_id, epoch_ms: 20 });

    assert_eq!(state.jobs["job-1"].state, JobState::Cancelled);
    assert_eq!(state.tasks_of("job-1")[0].status, TaskStatus::Pending);

    // Absorbing: nothing moves a cancelled job
    state.apply_event(&Event::JobAdvanced { id: job_id, state: JobState::Processing, epoch_ms: 30 });
    assert_eq!(state.jobs["job-1"].state, JobState::Cancelled);
}

#[test]
fn job_deleted_drops_tasks() {
    let mut state = planned_state("job-1", 3);
    state.apply_event(&Event::JobDeleted { id: JobId::from_string("job-1") });
    assert!(state.jobs.is_empty());
    assert!(state.tasks_of("job-1").is_empty());
}

#[test]
fn prefix_lookup_requires_uniqueness() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::JobCreated { job: queued_job("job-abc1") });
    state.apply_event(&Event::JobCreated { job: queued_job("job-abd2") });

    assert!(state.get_job("job-abc").is_some());
    assert!(state.get_job("job-ab").is_none());
    assert!(state.get_job("job-abd2").is_some());
}

#[test]
fn worker_heartbeat_upsert_and_loss() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::WorkerSeen { worker: worker("w1", 2, 1_000) });
    state.apply_event(&Event::WorkerSeen { worker: worker("w1", 4, 2_000) });

    assert_eq!(state.workers.len(), 1);
    assert_eq!(state.workers["w1"].caps.parallel_budget, 4);
    assert_eq!(state.workers["w1"].last_heartbeat_ms, 2_000);

    state.apply_event(&Event::WorkerLost { worker_id: WorkerId::new("w1"), epoch_ms: 9_000 });
    assert!(!state.workers["w1"].is_healthy(9_000, 5_000));
}

#[test]
fn stream_lifecycle_and_restreams() {
    let mut state = MaterializedState::default();
    let stream = LiveStream::new("user-1", "gig", true, 100);
    let sid = stream.id;
    state.apply_event(&Event::StreamCreated { stream });
    state.apply_event(&Event::StreamStarted { stream_id: sid, epoch_ms: 200 });
    state.apply_event(&Event::RestreamAdded {
        stream_id: sid,
        target: RestreamTarget {
            platform: "twitch".into(),
            ingest_url: "rtmp://twitch/app".into(),
            enabled: true,
            last_stats: None,
        },
    });
    state.apply_event(&Event::RestreamToggled {
        stream_id: sid,
        ingest_url: "rtmp://twitch/app".into(),
        enabled: false,
    });

    let stored = state.get_stream(sid.as_str()).unwrap();
    assert!(stored.is_live);
    assert!(!stored.restreams[0].enabled);

    let archive = JobId::from_string("job-vod");
    state.apply_event(&Event::StreamEnded {
        stream_id: sid,
        epoch_ms: 300,
        archive_job_id: Some(archive),
    });
    let stored = state.get_stream(sid.as_str()).unwrap();
    assert!(!stored.is_live);
    assert_eq!(stored.archive_job_id, Some(archive));
}

#[test]
fn telemetry_ratchets_total_viewers() {
    let mut state = MaterializedState::default();
    let stream = LiveStream::new("user-1", "gig", false, 100);
    let sid = stream.id;
    state.apply_event(&Event::StreamCreated { stream });

    for viewers in [3u64, 10, 7] {
        state.apply_event(&Event::StreamTelemetry {
            stream_id: sid,
            is_live: true,
            bitrate: 4_000_000,
            fps: 60.0,
            viewers,
        });
    }
    let stored = &state.streams[sid.as_str()];
    assert_eq!(stored.viewers, 7);
    assert_eq!(stored.total_viewers, 10);
}

#[test]
fn error_window_dedups_and_caps() {
    let mut state = MaterializedState::default();
    let err = KernelError::new(ErrorKind::Transient, codes::TASK_EXEC_FAILED, "x");
    state.apply_event(&Event::ErrorRecorded { error: err.clone() });
    state.apply_event(&Event::ErrorRecorded { error: err });
    assert_eq!(state.error_events.len(), 1);

    for n in 0..(MAX_ERROR_EVENTS + 10) {
        state.apply_event(&Event::ErrorRecorded {
            error: KernelError::new(ErrorKind::Transient, codes::TASK_EXEC_FAILED, format!("e{n}")),
        });
    }
    assert_eq!(state.error_events.len(), MAX_ERROR_EVENTS);
}

#[test]
fn snapshot_roundtrip_preserves_tables() {
    let state = planned_state("job-1", 2);
    let json = serde_json::to_string(&state).unwrap();
    let back: MaterializedState = serde_json::from_str(&json).unwrap();
    assert_eq!(back.jobs["job-1"], state.jobs["job-1"]);
    assert_eq!(back.tasks_of("job-1"), state.tasks_of("job-1"));
}

#[test]
fn stream_id_lookup_by_prefix() {
    let mut state = MaterializedState::default();
    let stream = LiveStream::new("user-1", "gig", false, 0);
    let id_str = stream.id.to_string();
    state.apply_event(&Event::StreamCreated { stream });
    assert!(state.get_stream(&id_str[..12]).is_some());
    assert!(state.get_stream(StreamId::from_string("str-zzz").as_str()).is_none());
}
