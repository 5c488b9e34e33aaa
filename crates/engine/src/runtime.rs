// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine: shared context and the event/timer plumbing.
//!
//! Handlers live in sibling modules ([`crate::scheduler`],
//! [`crate::router`], [`crate::publisher`], [`crate::live`],
//! [`crate::error_sink`]) as further `impl Engine` blocks. All of them
//! follow the same shape: compute events, [`Engine::record`] them, fan
//! out derived copies on the bus.

use crate::timer::{TimerWheel, Wakeup};
use crate::wire::{subjects, AuditRecord, JobEventMsg};
use cf_bus::{Bus, BusError};
use cf_core::{codes, Clock, EncodeProfile, ErrorKind, Event, Job, JobId, KernelError};
use cf_encoder::{DriverError, SegmentConfig};
use cf_plugin::{PluginError, PluginHost, RouteError};
use cf_storage::{save_snapshot, MaterializedState, SnapshotError, Wal, WalError};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub heartbeat_timeout_ms: u64,
    pub heartbeat_sweep_ms: u64,
    pub telemetry_interval_ms: u64,
    pub health_probe_ms: u64,
    pub checkpoint_interval_ms: u64,
    pub republish_interval_ms: u64,
    pub bus_sweep_ms: u64,
    /// Failed-job artifacts stay readable this long before GC.
    pub artifact_retention_ms: u64,
    /// An in-flight task with no progress report within this window is
    /// treated as stuck and retried.
    pub progress_keepalive_ms: u64,
    pub segment: SegmentConfig,
    pub task_backoff: cf_core::Backoff,
    pub publish_backoff: cf_core::Backoff,
    pub profiles: HashMap<String, EncodeProfile>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        let fallback = EncodeProfile::fallback();
        profiles.insert(fallback.name.clone(), fallback);
        Self {
            heartbeat_timeout_ms: 15_000,
            heartbeat_sweep_ms: 5_000,
            telemetry_interval_ms: 1_000,
            health_probe_ms: 10_000,
            checkpoint_interval_ms: 60_000,
            republish_interval_ms: 10_000,
            bus_sweep_ms: 1_000,
            artifact_retention_ms: 24 * 3600 * 1000,
            progress_keepalive_ms: 30_000,
            segment: SegmentConfig::default(),
            task_backoff: cf_core::Backoff::default(),
            publish_backoff: cf_core::Backoff::default(),
            profiles,
        }
    }
}

/// A submission from the façade.
#[derive(Debug, Clone)]
pub struct SubmitJob {
    pub owner: String,
    pub source: cf_core::JobSource,
    /// Named profile; `profile_inline` overrides when present.
    pub profile_name: Option<String>,
    pub profile_inline: Option<EncodeProfile>,
    pub publish_targets: Vec<cf_core::PublishTarget>,
    pub webhook_urls: Vec<String>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Kernel refuses new submissions while the bus is down.
    #[error("bus unavailable")]
    BusUnavailable,
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("stream not found: {0}")]
    StreamNotFound(String),
    #[error("unknown profile {0:?}")]
    UnknownProfile(String),
    #[error("job {0} is in a terminal state")]
    Terminal(String),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl EngineError {
    /// Structured form for the error sink and protocol responses.
    pub fn to_kernel(&self, epoch_ms: u64) -> KernelError {
        let (kind, code) = match self {
            EngineError::BusUnavailable | EngineError::Bus(BusError::Unavailable) => {
                (ErrorKind::BusUnavailable, codes::BUS_UNAVAILABLE)
            }
            EngineError::JobNotFound(_) => (ErrorKind::NotFound, codes::JOB_NOT_FOUND),
            EngineError::StreamNotFound(_) => (ErrorKind::NotFound, codes::STREAM_NOT_FOUND),
            EngineError::UnknownProfile(_) => (ErrorKind::Validation, codes::JOB_VALIDATION),
            EngineError::Terminal(_) => (ErrorKind::Validation, codes::JOB_TERMINAL),
            EngineError::Bus(_) | EngineError::Wal(_) | EngineError::Snapshot(_) => {
                (ErrorKind::Internal, codes::INTERNAL)
            }
            EngineError::Route(RouteError::AuthUnavailable) => {
                (ErrorKind::AuthFailed, codes::AUTH_UNAVAILABLE)
            }
            EngineError::Route(RouteError::NoStorageForScheme(_)) => {
                (ErrorKind::Validation, codes::NO_STORAGE_FOR_SCHEME)
            }
            EngineError::Route(_) => (ErrorKind::PluginDegraded, codes::PLUGIN_DEGRADED),
            EngineError::Plugin(e) if e.is_retriable() => {
                (ErrorKind::PluginCrashed, codes::PLUGIN_CRASHED)
            }
            EngineError::Plugin(_) => (ErrorKind::Permanent, codes::TASK_EXEC_FAILED),
            EngineError::Driver(DriverError::EmptySource) => {
                (ErrorKind::Validation, codes::JOB_VALIDATION)
            }
            EngineError::Driver(_) => (ErrorKind::Internal, codes::INTERNAL),
        };
        KernelError::new(kind, code, self.to_string()).epoch_ms(epoch_ms)
    }
}

/// The kernel engine.
pub struct Engine<C: Clock + 'static> {
    pub(crate) clock: C,
    pub(crate) config: EngineConfig,
    pub(crate) state: Arc<Mutex<MaterializedState>>,
    pub(crate) wal: Mutex<Wal>,
    pub(crate) bus: Arc<Bus<C>>,
    pub(crate) host: Arc<PluginHost<C>>,
    pub(crate) timers: Mutex<TimerWheel>,
    /// Per-job cancellation scopes; children (tasks, stitch, publish)
    /// inherit them.
    pub(crate) cancels: Mutex<HashMap<String, CancellationToken>>,
    /// Last report time per in-flight task (keepalive watchdog).
    /// Transient by design; a restart restarts the window.
    pub(crate) activity: Mutex<HashMap<String, u64>>,
    pub(crate) snapshot_path: PathBuf,
}

impl<C: Clock + 'static> Engine<C> {
    pub fn new(
        clock: C,
        config: EngineConfig,
        state: Arc<Mutex<MaterializedState>>,
        wal: Wal,
        bus: Arc<Bus<C>>,
        host: Arc<PluginHost<C>>,
        snapshot_path: PathBuf,
    ) -> Self {
        Self {
            clock,
            config,
            state,
            wal: Mutex::new(wal),
            bus,
            host,
            timers: Mutex::new(TimerWheel::new()),
            cancels: Mutex::new(HashMap::new()),
            activity: Mutex::new(HashMap::new()),
            snapshot_path,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn state(&self) -> &Arc<Mutex<MaterializedState>> {
        &self.state
    }

    pub fn host(&self) -> &Arc<PluginHost<C>> {
        &self.host
    }

    pub fn bus(&self) -> &Arc<Bus<C>> {
        &self.bus
    }

    /// Arm the recurring maintenance timers. Called once at startup.
    pub fn arm_maintenance_timers(&self) {
        let now = self.clock.now();
        let mut timers = self.timers.lock();
        let c = &self.config;
        timers.set("sweep:heartbeat", Wakeup::HeartbeatSweep, Duration::from_millis(c.heartbeat_sweep_ms), now);
        timers.set("tick:telemetry", Wakeup::TelemetryTick, Duration::from_millis(c.telemetry_interval_ms), now);
        timers.set("probe:health", Wakeup::HealthProbe, Duration::from_millis(c.health_probe_ms), now);
        timers.set("sweep:bus", Wakeup::BusSweep, Duration::from_millis(c.bus_sweep_ms), now);
        timers.set("checkpoint", Wakeup::Checkpoint, Duration::from_millis(c.checkpoint_interval_ms), now);
        timers.set("sweep:republish", Wakeup::RepublishSweep, Duration::from_millis(c.republish_interval_ms), now);
    }

    /// Journal and apply a batch of events.
    ///
    /// Transient events (progress, telemetry) are applied but never
    /// journaled; everything else hits the WAL with one group flush.
    pub fn record(&self, events: Vec<Event>) -> Result<(), EngineError> {
        if events.is_empty() {
            return Ok(());
        }
        let at_ms = self.clock.epoch_ms();
        {
            let mut state = self.state.lock();
            for event in &events {
                state.apply_event(event);
            }
        }
        let mut wal = self.wal.lock();
        let mut journaled = false;
        for event in &events {
            if !event.is_transient() {
                wal.append(event, at_ms)?;
                journaled = true;
            }
        }
        if journaled {
            wal.flush()?;
        }
        Ok(())
    }

    /// Publish a serializable payload on a subject (best-effort for
    /// derived fan-out; dispatch paths check errors explicitly).
    pub(crate) fn publish_json<T: Serialize>(&self, subject: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => {
                if let Err(e) = self.bus.publish(subject, value) {
                    debug!(subject, error = %e, "fan-out publish dropped");
                }
            }
            Err(e) => warn!(subject, error = %e, "unserializable fan-out payload"),
        }
    }

    /// Kernel-side job state fan-out on `jobs.events`.
    pub(crate) fn fan_out_job_event(&self, job: &Job) {
        self.publish_json(
            subjects::JOBS_EVENTS,
            &JobEventMsg {
                job_id: job.id,
                task_id: None,
                state: job.state.to_string(),
                progress_pct: Some(job.progress_pct),
                error: job.error.as_ref().map(|e| e.code.clone()),
            },
        );
    }

    /// Emit an audit record. Details must be pre-redacted by the caller.
    pub(crate) fn audit(
        &self,
        subject: &str,
        action: &str,
        actor: &str,
        resource_type: &str,
        resource_id: &str,
        correlation_id: &str,
    ) {
        self.publish_json(
            subject,
            &AuditRecord {
                action: action.to_string(),
                actor: actor.to_string(),
                resource_type: resource_type.to_string(),
                resource_id: resource_id.to_string(),
                correlation_id: correlation_id.to_string(),
                at_ms: self.clock.epoch_ms(),
                details: None,
            },
        );
    }

    /// Cancellation scope for a job (created on first use).
    pub(crate) fn cancel_token(&self, job_id: &JobId) -> CancellationToken {
        self.cancels
            .lock()
            .entry(job_id.to_string())
            .or_default()
            .clone()
    }

    pub(crate) fn drop_cancel_token(&self, job_id: &JobId) {
        self.cancels.lock().remove(job_id.as_str());
    }

    /// Workers currently inside the heartbeat window.
    pub fn healthy_worker_count(&self) -> usize {
        let now_ms = self.clock.epoch_ms();
        let timeout = self.config.heartbeat_timeout_ms;
        self.state
            .lock()
            .workers
            .values()
            .filter(|w| w.is_healthy(now_ms, timeout))
            .count()
    }

    /// Fire due timers and run their handlers. The daemon loop calls
    /// this on every wakeup; tests call it after advancing the clock.
    pub async fn tick(&self) -> Result<(), EngineError> {
        let wakeups = {
            let mut timers = self.timers.lock();
            timers.fired(self.clock.now())
        };
        for wakeup in wakeups {
            self.handle_wakeup(wakeup).await?;
        }
        Ok(())
    }

    /// Next timer deadline (drives the daemon loop's sleep).
    pub fn next_deadline(&self) -> Option<std::time::Instant> {
        self.timers.lock().next_deadline()
    }

    async fn handle_wakeup(&self, wakeup: Wakeup) -> Result<(), EngineError> {
        let now = self.clock.now();
        match wakeup {
            Wakeup::RequeueTask { job_id, task_id } => {
                self.requeue_task(job_id, task_id)?;
            }
            Wakeup::HeartbeatSweep => {
                self.heartbeat_sweep()?;
                self.stuck_sweep()?;
                self.timers.lock().set(
                    "sweep:heartbeat",
                    Wakeup::HeartbeatSweep,
                    Duration::from_millis(self.config.heartbeat_sweep_ms),
                    now,
                );
            }
            Wakeup::TelemetryTick => {
                self.telemetry_tick().await;
                self.timers.lock().set(
                    "tick:telemetry",
                    Wakeup::TelemetryTick,
                    Duration::from_millis(self.config.telemetry_interval_ms),
                    now,
                );
            }
            Wakeup::HealthProbe => {
                self.host.probe_all().await;
                let events = self.host.tick_health().await;
                self.record(events)?;
                self.timers.lock().set(
                    "probe:health",
                    Wakeup::HealthProbe,
                    Duration::from_millis(self.config.health_probe_ms),
                    now,
                );
            }
            Wakeup::BusSweep => {
                self.bus.sweep();
                self.timers.lock().set(
                    "sweep:bus",
                    Wakeup::BusSweep,
                    Duration::from_millis(self.config.bus_sweep_ms),
                    now,
                );
            }
            Wakeup::Checkpoint => {
                self.gc_sweep().await?;
                self.checkpoint()?;
                self.timers.lock().set(
                    "checkpoint",
                    Wakeup::Checkpoint,
                    Duration::from_millis(self.config.checkpoint_interval_ms),
                    now,
                );
            }
            Wakeup::RepublishSweep => {
                // Parks while the bus is down; resumes on reconnect
                if self.bus.is_available() {
                    self.republish_sweep();
                }
                self.timers.lock().set(
                    "sweep:republish",
                    Wakeup::RepublishSweep,
                    Duration::from_millis(self.config.republish_interval_ms),
                    now,
                );
            }
        }
        Ok(())
    }

    /// Snapshot the state and truncate the WAL through the covered seq.
    pub fn checkpoint(&self) -> Result<(), EngineError> {
        let state_copy = self.state.lock().clone();
        let mut wal = self.wal.lock();
        wal.flush()?;
        let seq = wal.write_seq();
        save_snapshot(&self.snapshot_path, &state_copy, seq)?;
        wal.truncate_through(seq)?;
        debug!(seq, "checkpoint written");
        Ok(())
    }

    /// Graceful shutdown: journal the marker, flush, close the bus.
    pub fn shutdown(&self) -> Result<(), EngineError> {
        self.record(vec![Event::Shutdown])?;
        self.checkpoint()?;
        self.bus.shutdown();
        self.host.clear();
        Ok(())
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
