// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::runtime::SubmitJob;
use crate::test_helpers::kernel;
use crate::wire::STREAM_WORK;
use cf_core::TaskStatus;

#[tokio::test]
async fn claim_sets_in_flight_and_advances_job() {
    let k = kernel();
    k.heartbeat("w1", 2);
    k.heartbeat("w2", 2);
    let job_id = k.submit(vec![]).await;
    let tasks = k.tasks(job_id.as_str());

    k.report(&tasks[0], "w1", TaskOutcome::Claimed).await;

    let state = k.engine.state().lock();
    let task = &state.tasks_of(job_id.as_str())[0];
    assert_eq!(task.status, TaskStatus::InFlight);
    assert_eq!(task.attempt_count, 1);
    assert_eq!(task.assigned_worker.as_ref().map(|w| w.as_str()), Some("w1"));
    assert_eq!(state.jobs[job_id.as_str()].state, JobState::Processing);
}

#[tokio::test]
async fn claim_for_unknown_task_is_dropped() {
    let k = kernel();
    k.heartbeat("w1", 2);
    k.heartbeat("w2", 2);
    let job_id = k.submit(vec![]).await;
    let mut ghost = k.tasks(job_id.as_str())[0].clone();
    ghost.id = cf_core::TaskId::from_string("tsk-ghost");

    k.report(&ghost, "w1", TaskOutcome::Claimed).await;
    assert_eq!(k.job_state(job_id.as_str()), JobState::Queued);
}

#[tokio::test]
async fn claim_over_budget_is_refused() {
    let k = kernel();
    k.heartbeat("w1", 1);
    k.heartbeat("w2", 1);
    let job_id = k.submit(vec![]).await;
    let tasks = k.tasks(job_id.as_str());
    assert!(tasks.len() >= 2);

    k.report(&tasks[0], "w1", TaskOutcome::Claimed).await;
    k.report(&tasks[1], "w1", TaskOutcome::Claimed).await;

    let state = k.engine.state().lock();
    let stored = state.tasks_of(job_id.as_str());
    assert_eq!(stored[0].status, TaskStatus::InFlight);
    assert_eq!(stored[1].status, TaskStatus::Pending, "budget of 1 must refuse the second claim");
}

#[tokio::test]
async fn progress_reports_update_job_aggregate() {
    let k = kernel();
    k.heartbeat("w1", 4);
    k.heartbeat("w2", 4);
    let job_id = k.submit(vec![]).await;
    let tasks = k.tasks(job_id.as_str());
    assert_eq!(tasks.len(), 4);

    k.report(&tasks[0], "w1", TaskOutcome::Claimed).await;
    k.report(&tasks[0], "w1", TaskOutcome::Progress { percent: 80.0, speed: 2.0, fps: 60.0, bitrate: 0 }).await;

    {
        let state = k.engine.state().lock();
        assert_eq!(state.tasks_of(job_id.as_str())[0].last_progress_pct, 80.0);
        // 80 / 4 tasks
        assert!((state.jobs[job_id.as_str()].progress_pct - 20.0).abs() < 1e-9);
    }

    // Regression clamps
    k.report(&tasks[0], "w1", TaskOutcome::Progress { percent: 10.0, speed: 2.0, fps: 60.0, bitrate: 0 }).await;
    let state = k.engine.state().lock();
    assert_eq!(state.tasks_of(job_id.as_str())[0].last_progress_pct, 80.0);
}

#[tokio::test]
async fn retry_then_succeed() {
    let k = kernel();
    k.heartbeat("w1", 4);
    let job_id = k.submit(vec![]).await;
    let task = k.tasks(job_id.as_str())[0].clone();

    k.report(&task, "w1", TaskOutcome::Claimed).await;
    k.report(&task, "w1", TaskOutcome::Failed { exit_code: 1, message: "transient".into() }).await;

    // Backoff armed at ~5s; nothing requeued before it elapses
    k.clock.advance_secs(2);
    k.engine.tick().await.unwrap();
    assert_eq!(k.tasks(job_id.as_str())[0].status, TaskStatus::Failed);

    k.clock.advance_secs(4);
    k.engine.tick().await.unwrap();
    assert_eq!(k.tasks(job_id.as_str())[0].status, TaskStatus::Pending);

    // Second attempt succeeds
    let finish = k.run_task(&task, "w1").await;
    assert!(finish.is_some());

    let state = k.engine.state().lock();
    let stored = &state.tasks_of(job_id.as_str())[0];
    assert_eq!(stored.attempt_count, 2);
    assert_eq!(stored.status, TaskStatus::Completed);
}

#[tokio::test]
async fn exhausted_attempts_fail_the_job() {
    let k = kernel();
    k.heartbeat("w1", 4);
    let mut probe = k.encoder.probe_result.lock().clone();
    probe.duration_seconds = 20.0;
    probe.keyframes = vec![0.0, 10.0];
    *k.encoder.probe_result.lock() = probe;

    let job_id = k
        .engine
        .submit_job(SubmitJob {
            owner: "user-1".into(),
            source: cf_core::JobSource::Url { url: "https://x/in.mp4".into() },
            profile_name: None,
            profile_inline: Some(cf_core::EncodeProfile {
                max_attempts: Some(1),
                ..cf_core::EncodeProfile::fallback()
            }),
            publish_targets: vec![],
            webhook_urls: vec![],
        })
        .await
        .unwrap();
    let task = k.tasks(job_id.as_str())[0].clone();

    k.report(&task, "w1", TaskOutcome::Claimed).await;
    k.report(&task, "w1", TaskOutcome::Failed { exit_code: 1, message: "boom".into() }).await;

    assert_eq!(k.job_state(job_id.as_str()), JobState::Failed);
    {
        let state = k.engine.state().lock();
        let job = &state.jobs[job_id.as_str()];
        assert_eq!(job.error.as_ref().unwrap().code, cf_core::codes::JOB_ATTEMPTS_EXHAUSTED);
    }

    // No further dispatch: the sweep skips failed jobs
    let before = k.bus.ready_len(STREAM_WORK);
    k.clock.advance_secs(600);
    k.engine.tick().await.unwrap();
    assert_eq!(k.bus.ready_len(STREAM_WORK), before);
}

#[tokio::test]
async fn corrupt_input_fails_immediately() {
    let k = kernel();
    k.heartbeat("w1", 4);
    let job_id = k.submit(vec![]).await;
    let task = k.tasks(job_id.as_str())[0].clone();

    k.report(&task, "w1", TaskOutcome::Claimed).await;
    k.report(&task, "w1", TaskOutcome::Failed { exit_code: 69, message: "corrupt input".into() }).await;

    // One attempt left on the budget, but exit 69 is permanent
    assert_eq!(k.job_state(job_id.as_str()), JobState::Failed);
}

#[tokio::test]
async fn worker_loss_reverts_without_consuming_attempt() {
    let k = kernel();
    k.engine.arm_maintenance_timers();
    k.heartbeat("w1", 2);
    k.heartbeat("w2", 2);
    let job_id = k.submit(vec![]).await;
    let task = k.tasks(job_id.as_str())[2].clone();

    k.report(&task, "w1", TaskOutcome::Claimed).await;
    assert_eq!(k.tasks(job_id.as_str())[2].attempt_count, 1);

    // w1 goes silent; w2 keeps beating
    for _ in 0..5 {
        k.clock.advance_secs(5);
        k.heartbeat("w2", 2);
        k.engine.tick().await.unwrap();
    }

    let reverted = k.tasks(job_id.as_str())[2].clone();
    assert_eq!(reverted.status, TaskStatus::Pending);
    assert_eq!(reverted.attempt_count, 0, "revert refunds the attempt");
    assert!(reverted.assigned_worker.is_none());

    // w2 picks it up and completes
    k.run_task(&task, "w2").await;
    let state = k.engine.state().lock();
    let stored = &state.tasks_of(job_id.as_str())[2];
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.attempt_count, 1);
    assert_eq!(stored.assigned_worker.as_ref().map(|w| w.as_str()), Some("w2"));
}

#[tokio::test]
async fn silent_task_is_treated_as_stuck() {
    let k = kernel();
    k.heartbeat("w1", 4);
    let job_id = k.submit(vec![]).await;
    let task = k.tasks(job_id.as_str())[0].clone();

    k.report(&task, "w1", TaskOutcome::Claimed).await;

    // Worker keeps heartbeating but the task never reports progress
    k.clock.advance_secs(35);
    k.heartbeat("w1", 4);
    k.engine.stuck_sweep().unwrap();

    let state = k.engine.state().lock();
    let stored = &state.tasks_of(job_id.as_str())[0];
    assert_eq!(stored.status, TaskStatus::Failed);
    drop(state);

    // The timeout is transient: a requeue timer is armed (~5s)
    k.clock.advance_secs(6);
    k.engine.tick().await.unwrap();
    assert_eq!(k.tasks(job_id.as_str())[0].status, TaskStatus::Pending);
    assert_eq!(k.tasks(job_id.as_str())[0].attempt_count, 1);
}

#[tokio::test]
async fn progress_keeps_a_task_alive() {
    let k = kernel();
    k.heartbeat("w1", 4);
    let job_id = k.submit(vec![]).await;
    let task = k.tasks(job_id.as_str())[0].clone();
    k.report(&task, "w1", TaskOutcome::Claimed).await;

    for _ in 0..4 {
        k.clock.advance_secs(20);
        k.report(&task, "w1", TaskOutcome::Progress { percent: 10.0, speed: 1.0, fps: 30.0, bitrate: 0 })
            .await;
        k.engine.stuck_sweep().unwrap();
    }
    assert_eq!(k.tasks(job_id.as_str())[0].status, TaskStatus::InFlight);
}

#[tokio::test]
async fn unhealthy_worker_tasks_reassigned_within_one_sweep() {
    let k = kernel();
    k.heartbeat("w1", 2);
    k.heartbeat("w2", 2);
    let job_id = k.submit(vec![]).await;
    let tasks = k.tasks(job_id.as_str());
    k.report(&tasks[0], "w1", TaskOutcome::Claimed).await;
    k.report(&tasks[1], "w1", TaskOutcome::Claimed).await;

    k.clock.advance_secs(20);
    k.heartbeat("w2", 2);
    k.engine.heartbeat_sweep().unwrap();

    let state = k.engine.state().lock();
    for task in state.tasks_of(job_id.as_str()) {
        assert!(
            task.status == TaskStatus::Pending
                || task.assigned_worker.as_ref().map(|w| w.as_str()) != Some("w1"),
            "no task may stay assigned to the lost worker",
        );
    }
}
