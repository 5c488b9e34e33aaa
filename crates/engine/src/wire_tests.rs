// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cf_core::FakeClock;

#[test]
fn dispatch_roundtrip() {
    let dispatch = TaskDispatch {
        task_id: TaskId::from_string("tsk-1"),
        job_id: JobId::from_string("job-1"),
        input_url: "https://cdn/in.mp4".into(),
        output_url: "fs://media/outputs/job-1/seg0000.mp4".into(),
        profile: EncodeProfile::fallback(),
        start_time: 0.0,
        duration: 30.0,
    };
    let json = serde_json::to_string(&dispatch).unwrap();
    let back: TaskDispatch = serde_json::from_str(&json).unwrap();
    assert_eq!(back, dispatch);
}

#[test]
fn report_outcome_tags() {
    let report = TaskReport {
        task_id: TaskId::from_string("tsk-1"),
        job_id: JobId::from_string("job-1"),
        worker_id: WorkerId::new("w1"),
        outcome: TaskOutcome::Failed { exit_code: 137, message: "oom".into() },
    };
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"], "failed");
    assert_eq!(json["exit_code"], 137);

    let back: TaskReport = serde_json::from_value(json).unwrap();
    assert_eq!(back, report);
}

#[test]
fn telemetry_subject_per_stream() {
    assert_eq!(subjects::live_telemetry("str-1"), "live.telemetry.str-1");
    assert_eq!(subjects::live_lifecycle("str-1"), "live.lifecycle.str-1");
}

#[test]
fn declared_streams_capture_kernel_subjects() {
    let bus = Bus::new(None, FakeClock::new());
    declare_streams(&bus).unwrap();

    assert!(bus.publish(subjects::JOBS_DISPATCH, serde_json::json!({})).is_ok());
    assert!(bus.publish(subjects::JOBS_EVENTS, serde_json::json!({})).is_ok());
    assert!(bus.publish(subjects::WORKERS_HEARTBEAT, serde_json::json!({})).is_ok());
    assert!(bus.publish(subjects::AUDIT_SYSTEM, serde_json::json!({})).is_ok());
    assert!(bus.publish(subjects::EVENTS_ERROR, serde_json::json!({})).is_ok());
    assert!(bus.publish(&subjects::live_telemetry("str-1"), serde_json::json!({})).is_ok());
    assert!(bus.publish(&subjects::live_lifecycle("str-1"), serde_json::json!({})).is_ok());
}
