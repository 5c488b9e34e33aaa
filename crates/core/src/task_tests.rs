// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::{codes, ErrorKind};

fn plan(bounds: &[(f64, f64)]) -> Vec<Task> {
    bounds
        .iter()
        .enumerate()
        .map(|(i, (s, e))| Task::new(JobId::from_string("job-1"), i as u32, *s, *e))
        .collect()
}

#[test]
fn claim_consumes_attempt() {
    let mut task = Task::new(JobId::from_string("job-1"), 0, 0.0, 30.0);
    task.claim(WorkerId::new("w1")).unwrap();

    assert_eq!(task.status, TaskStatus::InFlight);
    assert_eq!(task.attempt_count, 1);
    assert_eq!(task.assigned_worker.as_ref().map(|w| w.as_str()), Some("w1"));
}

#[test]
fn claim_rejects_in_flight() {
    let mut task = Task::new(JobId::from_string("job-1"), 0, 0.0, 30.0);
    task.claim(WorkerId::new("w1")).unwrap();
    let err = task.claim(WorkerId::new("w2")).unwrap_err();
    assert_eq!(err, ClaimError::NotClaimable(TaskStatus::InFlight));
}

#[test]
fn claim_rejects_exhausted_budget() {
    let mut task = Task::new(JobId::from_string("job-1"), 0, 0.0, 30.0).with_max_attempts(1);
    task.claim(WorkerId::new("w1")).unwrap();
    task.fail(KernelError::new(ErrorKind::Transient, codes::TASK_EXEC_FAILED, "x"));
    task.requeue();

    assert_eq!(task.claim(WorkerId::new("w1")).unwrap_err(), ClaimError::AttemptsExhausted);
}

#[test]
fn requeue_preserves_attempt_count() {
    let mut task = Task::new(JobId::from_string("job-1"), 0, 0.0, 30.0);
    task.claim(WorkerId::new("w1")).unwrap();
    task.fail(KernelError::new(ErrorKind::Transient, codes::TASK_EXEC_FAILED, "x"));
    task.requeue();

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.attempt_count, 1);
    assert!(task.assigned_worker.is_none());
}

#[test]
fn revert_refunds_attempt() {
    let mut task = Task::new(JobId::from_string("job-1"), 0, 0.0, 30.0);
    task.claim(WorkerId::new("w1")).unwrap();
    task.revert();

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.attempt_count, 0);

    // Revert of a non-in-flight task is a no-op
    task.complete("out/seg0.ts".into(), 1024);
    task.revert();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[test]
fn complete_records_output() {
    let mut task = Task::new(JobId::from_string("job-1"), 0, 0.0, 30.0);
    task.claim(WorkerId::new("w1")).unwrap();
    task.complete("out/seg0.ts".into(), 4096);

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.output_key.as_deref(), Some("out/seg0.ts"));
    assert_eq!(task.output_size, Some(4096));
    assert_eq!(task.contribution_pct(), 100.0);
}

#[test]
fn progress_clamps_regressions() {
    let mut task = Task::new(JobId::from_string("job-1"), 0, 0.0, 30.0);
    task.report_progress(42.0);
    task.report_progress(17.0);
    assert_eq!(task.last_progress_pct, 42.0);

    task.report_progress(150.0);
    assert_eq!(task.last_progress_pct, 100.0);

    task.report_progress(-5.0);
    assert_eq!(task.last_progress_pct, 100.0);
}

#[test]
fn validate_plan_accepts_contiguous_coverage() {
    let tasks = plan(&[(0.0, 10.0), (10.0, 20.0), (20.0, 40.0)]);
    assert!(validate_plan(&tasks, 40.0).is_ok());
}

#[test]
fn validate_plan_rejects_gap() {
    let tasks = plan(&[(0.0, 10.0), (10.5, 20.0)]);
    assert!(matches!(
        validate_plan(&tasks, 20.0),
        Err(PlanError::BoundaryMismatch { index: 1, .. })
    ));
}

#[test]
fn validate_plan_rejects_short_coverage() {
    let tasks = plan(&[(0.0, 10.0)]);
    assert!(matches!(validate_plan(&tasks, 20.0), Err(PlanError::CoverageGap { .. })));
}

#[test]
fn validate_plan_rejects_index_gap() {
    let mut tasks = plan(&[(0.0, 10.0), (10.0, 20.0)]);
    tasks[1].index = 5;
    assert!(matches!(
        validate_plan(&tasks, 20.0),
        Err(PlanError::IndexGap { expected: 1, found: 5 })
    ));
}

#[test]
fn validate_plan_tolerates_float_noise() {
    let tasks = plan(&[(0.0, 10.000000), (10.0000003, 20.0)]);
    assert!(validate_plan(&tasks, 20.0000004).is_ok());
}

#[test]
fn validate_plan_rejects_empty() {
    assert!(matches!(validate_plan(&[], 10.0), Err(PlanError::Empty)));
}
