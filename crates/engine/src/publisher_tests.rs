// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{kernel, TestKernel};
use cf_core::{JobState, PublishStatus};

async fn run_to_stitching(k: &crate::test_helpers::TestKernel, targets: Vec<cf_core::PublishTarget>) -> cf_core::JobId {
    k.heartbeat("w1", 4);
    let job_id = k.submit(targets).await;
    for task in k.tasks(job_id.as_str()) {
        k.run_task(&task, "w1").await;
    }
    job_id
}

#[tokio::test]
async fn publishes_to_all_targets() {
    let k = kernel();
    let job_id = run_to_stitching(&k, vec![TestKernel::target("twitch"), TestKernel::target("kick")]).await;
    k.engine.finish_job(job_id).await.unwrap();

    assert_eq!(k.job_state(job_id.as_str()), JobState::Completed);
    let state = k.engine.state().lock();
    let job = &state.jobs[job_id.as_str()];
    assert!(job.publishing_settled());
    assert_eq!(job.publish_outcomes.len(), 2);
    for outcome in &job.publish_outcomes {
        assert!(matches!(outcome.status, PublishStatus::Published { .. }));
        assert_eq!(outcome.attempts, 1);
    }
    assert_eq!(k.publisher.published.lock().len(), 2);
}

#[tokio::test]
async fn partial_failure_still_completes() {
    let k = kernel();
    // kick fails more times than the retry budget allows
    k.publisher.failures.lock().insert("kick".to_string(), 99);

    let job_id = run_to_stitching(&k, vec![TestKernel::target("twitch"), TestKernel::target("kick")]).await;
    k.engine.finish_job(job_id).await.unwrap();

    assert_eq!(k.job_state(job_id.as_str()), JobState::Completed);
    let state = k.engine.state().lock();
    let job = &state.jobs[job_id.as_str()];

    let twitch = job.publish_outcomes.iter().find(|o| o.platform == "twitch").unwrap();
    assert!(matches!(twitch.status, PublishStatus::Published { .. }));

    let kick = job.publish_outcomes.iter().find(|o| o.platform == "kick").unwrap();
    assert!(matches!(kick.status, PublishStatus::Failed { .. }));
    assert_eq!(kick.attempts, 3);
}

#[tokio::test]
async fn all_targets_failing_fails_the_job() {
    let k = kernel();
    k.publisher.failures.lock().insert("twitch".to_string(), 99);
    k.publisher.failures.lock().insert("kick".to_string(), 99);

    let job_id = run_to_stitching(&k, vec![TestKernel::target("twitch"), TestKernel::target("kick")]).await;
    k.engine.finish_job(job_id).await.unwrap();

    assert_eq!(k.job_state(job_id.as_str()), JobState::Failed);
    let state = k.engine.state().lock();
    assert_eq!(
        state.jobs[job_id.as_str()].error.as_ref().unwrap().code,
        cf_core::codes::PUBLISH_FAILED
    );
}

#[tokio::test]
async fn transient_publish_failure_retries_to_success() {
    let k = kernel();
    k.publisher.failures.lock().insert("kick".to_string(), 1);

    let job_id = run_to_stitching(&k, vec![TestKernel::target("kick")]).await;
    k.engine.finish_job(job_id).await.unwrap();

    assert_eq!(k.job_state(job_id.as_str()), JobState::Completed);
    let state = k.engine.state().lock();
    let kick = &state.jobs[job_id.as_str()].publish_outcomes[0];
    assert!(matches!(kick.status, PublishStatus::Published { .. }));
    assert_eq!(kick.attempts, 2);
}

#[tokio::test]
async fn unknown_platform_records_failure_without_retry_storm() {
    let k = kernel();
    let job_id = run_to_stitching(&k, vec![TestKernel::target("rumble")]).await;
    k.engine.finish_job(job_id).await.unwrap();

    // rumble has no publisher registered; the single target fails, so
    // the job fails with the publish error
    assert_eq!(k.job_state(job_id.as_str()), JobState::Failed);
    let state = k.engine.state().lock();
    let outcome = &state.jobs[job_id.as_str()].publish_outcomes[0];
    assert!(matches!(outcome.status, PublishStatus::Failed { .. }));
    assert_eq!(outcome.attempts, 1);
}
