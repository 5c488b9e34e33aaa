// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon's event loop: bus subscriptions in, engine handlers out.
//!
//! Worker reports arrive on `jobs.events` (kernel fan-out on the same
//! subject parses as a different shape and is skipped); heartbeats on
//! `workers.heartbeat`. Timer deadlines drive `Engine::tick`.

use crate::lifecycle::DaemonEngine;
use cf_core::Clock;
use cf_engine::{subjects, HeartbeatMsg, TaskReport};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Idle sleep when no timer is armed.
const IDLE_SLEEP: Duration = Duration::from_millis(500);

pub async fn run(engine: Arc<DaemonEngine>, shutdown: CancellationToken) {
    let mut reports = match engine.bus().subscribe(subjects::JOBS_EVENTS) {
        Ok(sub) => sub,
        Err(e) => {
            error!(error = %e, "cannot subscribe to job events");
            return;
        }
    };
    let mut heartbeats = match engine.bus().subscribe(subjects::WORKERS_HEARTBEAT) {
        Ok(sub) => sub,
        Err(e) => {
            error!(error = %e, "cannot subscribe to heartbeats");
            return;
        }
    };

    loop {
        let deadline = engine
            .next_deadline()
            .map(tokio::time::Instant::from_std)
            .unwrap_or_else(|| tokio::time::Instant::now() + IDLE_SLEEP);

        tokio::select! {
            _ = shutdown.cancelled() => break,

            Some(message) = reports.next() => {
                // Worker-originated reports carry an `outcome` tag;
                // kernel fan-out on the same subject does not.
                let Ok(report) = serde_json::from_value::<TaskReport>(message.payload) else {
                    continue;
                };
                match engine.handle_task_report(report).await {
                    Ok(Some(job_id)) => {
                        if let Err(e) = engine.finish_job(job_id).await {
                            let kernel = e.to_kernel(engine.clock().epoch_ms());
                            engine.sink_error(&kernel);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "task report failed"),
                }
            }

            Some(message) = heartbeats.next() => {
                let Ok(heartbeat) = serde_json::from_value::<HeartbeatMsg>(message.payload) else {
                    continue;
                };
                if let Err(e) = engine.handle_heartbeat(heartbeat) {
                    warn!(error = %e, "heartbeat failed");
                }
            }

            _ = tokio::time::sleep_until(deadline) => {
                if let Err(e) = engine.tick().await {
                    warn!(error = %e, "engine tick failed");
                }
            }
        }
    }
}
