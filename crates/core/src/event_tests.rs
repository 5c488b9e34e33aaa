// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::job::JobState;

#[test]
fn events_tag_with_domain_verb() {
    let event = Event::JobAdvanced {
        id: JobId::from_string("job-1"),
        state: JobState::Processing,
        epoch_ms: 5,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "job:advanced");
    assert_eq!(json["state"], "processing");
}

#[test]
fn event_roundtrip() {
    let event = Event::TaskCompleted {
        task_id: TaskId::from_string("tsk-1"),
        job_id: JobId::from_string("job-1"),
        worker_id: WorkerId::new("w1"),
        output_key: "out/seg0.ts".to_string(),
        output_size: 9000,
        epoch_ms: 77,
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn name_matches_serde_tag() {
    let event = Event::WorkerLost { worker_id: WorkerId::new("w1"), epoch_ms: 0 };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], event.name());
}

#[test]
fn transient_classification() {
    let progress = Event::TaskProgressed {
        task_id: TaskId::from_string("tsk-1"),
        job_id: JobId::from_string("job-1"),
        percent: 50.0,
    };
    assert!(progress.is_transient());

    let telemetry = Event::StreamTelemetry {
        stream_id: StreamId::from_string("str-1"),
        is_live: true,
        bitrate: 4_000_000,
        fps: 60.0,
        viewers: 10,
    };
    assert!(telemetry.is_transient());

    let durable = Event::Shutdown;
    assert!(!durable.is_transient());
}
