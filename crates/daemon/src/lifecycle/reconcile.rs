// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-startup reconciliation.
//!
//! Runs once after READY so the socket answers immediately: stale
//! workers lose their tasks back to the queue, restream destinations are
//! reapplied to the live plugin, and undispatched Pending tasks get
//! their dispatch republished.

use super::DaemonState;
use tracing::{info, warn};

pub async fn reconcile(daemon: &DaemonState) {
    let engine = &daemon.engine;

    if let Err(e) = engine.heartbeat_sweep() {
        warn!(error = %e, "worker reconciliation failed");
    }
    if let Err(e) = engine.reconcile_restreams().await {
        warn!(error = %e, "restream reconciliation failed");
    }
    if let Err(e) = engine.resume_unfinished().await {
        warn!(error = %e, "resume of interrupted jobs failed");
    }
    engine.republish_sweep();

    let state = engine.state().lock();
    info!(
        jobs = state.jobs.values().filter(|j| !j.is_terminal()).count(),
        live_streams = state.streams.values().filter(|s| s.is_live).count(),
        workers = state.workers.len(),
        "reconciliation complete",
    );
}
