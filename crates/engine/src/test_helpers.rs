// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared wiring for engine tests: a full kernel over fake plugins, an
//! in-memory bus, and a temp-dir WAL, driven by a fake clock.

use crate::runtime::{Engine, EngineConfig, SubmitJob};
use crate::wire::{self, HeartbeatMsg, TaskOutcome, TaskReport};
use cf_bus::Bus;
use cf_core::{
    Backoff, Clock, FakeClock, JobSource, PublishTarget, Task, WorkerCaps, WorkerId,
};
use cf_plugin::fake::{self, FakeEncoder, FakeLive, FakePublisher, FakeStorage};
use cf_plugin::{PluginApi, PluginHost};
use cf_storage::{MaterializedState, Wal};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub struct TestKernel {
    pub engine: Arc<Engine<FakeClock>>,
    pub clock: FakeClock,
    pub bus: Arc<Bus<FakeClock>>,
    pub host: Arc<PluginHost<FakeClock>>,
    pub encoder: Arc<FakeEncoder>,
    pub storage: Arc<FakeStorage>,
    pub live: Arc<FakeLive>,
    pub publisher: Arc<FakePublisher>,
    _dir: tempfile::TempDir,
}

pub fn kernel() -> TestKernel {
    kernel_with(test_config())
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        // Publishing retries sleep on the tokio clock; keep them short
        publish_backoff: Backoff { base_ms: 1, cap_ms: 4, max_attempts: 3 },
        ..EngineConfig::default()
    }
}

pub fn kernel_with(config: EngineConfig) -> TestKernel {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = FakeClock::new();
    let bus = Arc::new(Bus::new(None, clock.clone()));
    wire::declare_streams(&bus).expect("streams");

    let host = Arc::new(PluginHost::new(clock.clone()));
    let encoder = Arc::new(FakeEncoder::default());
    let storage = Arc::new(FakeStorage::default());
    let live = Arc::new(FakeLive::default());
    let publisher = Arc::new(FakePublisher::default());

    register(&host, &encoder, &storage, &live, &publisher);

    let wal = Wal::open(&dir.path().join("events.wal")).expect("wal");
    let state = Arc::new(Mutex::new(MaterializedState::default()));
    let engine = Arc::new(Engine::new(
        clock.clone(),
        config,
        state,
        wal,
        Arc::clone(&bus),
        Arc::clone(&host),
        dir.path().join("snapshot.zst"),
    ));

    TestKernel { engine, clock, bus, host, encoder, storage, live, publisher, _dir: dir }
}

fn register(
    host: &PluginHost<FakeClock>,
    encoder: &Arc<FakeEncoder>,
    storage: &Arc<FakeStorage>,
    live: &Arc<FakeLive>,
    publisher: &Arc<FakePublisher>,
) {
    use cf_core::{CapabilitySet, PluginType};
    let entries = vec![
        (
            fake::manifest("fake-fs", PluginType::Storage, CapabilitySet {
                url_schemes: vec!["fs".into(), "file".into(), "http".into(), "https".into()],
                ..CapabilitySet::default()
            }),
            PluginApi::Storage(Arc::clone(storage) as _),
        ),
        (
            fake::manifest("fake-enc", PluginType::Encoder, CapabilitySet {
                video_codecs: vec!["h264".into(), "hevc".into()],
                ..CapabilitySet::default()
            }),
            PluginApi::Encoder(Arc::clone(encoder) as _),
        ),
        (
            fake::manifest("fake-live", PluginType::Live, CapabilitySet {
                ingest_protocols: vec!["rtmp".into()],
                ..CapabilitySet::default()
            }),
            PluginApi::Live(Arc::clone(live) as _),
        ),
        (
            fake::manifest("fake-pub", PluginType::Publisher, CapabilitySet {
                platforms: vec!["twitch".into(), "kick".into()],
                ..CapabilitySet::default()
            }),
            PluginApi::Publisher(Arc::clone(publisher) as _),
        ),
    ];
    for (manifest, api) in entries {
        host.register(manifest, HashMap::new(), api, None).expect("register");
    }
}

impl TestKernel {
    /// Heartbeat a worker into the healthy set.
    pub fn heartbeat(&self, worker: &str, budget: u32) {
        self.engine
            .handle_heartbeat(HeartbeatMsg {
                worker_id: WorkerId::new(worker),
                hostname: format!("host-{worker}"),
                capabilities: WorkerCaps {
                    codecs: vec!["h264".into(), "hevc".into()],
                    gpu: None,
                    parallel_budget: budget,
                },
                timestamp_ms: self.clock.epoch_ms(),
            })
            .expect("heartbeat");
    }

    /// Submit a plain URL job with the fallback profile.
    pub async fn submit(&self, targets: Vec<PublishTarget>) -> cf_core::JobId {
        self.engine
            .submit_job(SubmitJob {
                owner: "user-1".into(),
                source: JobSource::Url { url: "https://cdn.example/in.mp4".into() },
                profile_name: None,
                profile_inline: None,
                publish_targets: targets,
                webhook_urls: Vec::new(),
            })
            .await
            .expect("submit")
    }

    pub fn tasks(&self, job_id: &str) -> Vec<Task> {
        self.engine.state().lock().tasks_of(job_id).to_vec()
    }

    pub fn job_state(&self, job_id: &str) -> cf_core::JobState {
        self.engine.state().lock().jobs[job_id].state
    }

    pub async fn report(
        &self,
        task: &Task,
        worker: &str,
        outcome: TaskOutcome,
    ) -> Option<cf_core::JobId> {
        self.engine
            .handle_task_report(TaskReport {
                task_id: task.id,
                job_id: task.job_id,
                worker_id: WorkerId::new(worker),
                outcome,
            })
            .await
            .expect("report")
    }

    /// Claim-and-complete a task in one go.
    pub async fn run_task(&self, task: &Task, worker: &str) -> Option<cf_core::JobId> {
        self.report(task, worker, TaskOutcome::Claimed).await;
        self.report(
            task,
            worker,
            TaskOutcome::Completed {
                output_key: format!("outputs/{}/seg{:04}.mp4", task.job_id, task.index),
                output_size: 1024,
            },
        )
        .await
    }

    pub fn target(platform: &str) -> PublishTarget {
        PublishTarget {
            platform: platform.to_string(),
            privacy: "public".to_string(),
            title: "test upload".to_string(),
            description: String::new(),
            credentials_ref: format!("vault:{platform}/creds"),
        }
    }
}
