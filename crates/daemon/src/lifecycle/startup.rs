// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup: lock, recover, declare streams, launch plugins, build the
//! engine, bind the control socket.

use super::{Config, DaemonState, LifecycleError};
use crate::launcher::SubprocessLauncher;
use cf_bus::Bus;
use cf_core::{Event, PluginHealth, SystemClock};
use cf_engine::{declare_streams, Engine, EngineConfig};
use cf_plugin::{check_protocol, discover_manifests, ErrorWindow, Launcher, PluginHost};
use cf_storage::{load_snapshot, MaterializedState, Wal};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UnixListener;
use tracing::{info, warn};

/// Result of daemon startup: state for the loops plus the bound socket.
pub struct StartupResult {
    pub daemon: DaemonState,
    pub listener: UnixListener,
}

impl std::fmt::Debug for StartupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupResult").finish_non_exhaustive()
    }
}

pub async fn startup(config: Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Exclusive PID lock: one daemon per state dir
    let mut lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&config.lock_path)?;
    if lock_file.try_lock_exclusive().is_err() {
        return Err(LifecycleError::AlreadyRunning(config.lock_path.clone()));
    }
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // Stale socket from a crashed run
    let _ = std::fs::remove_file(&config.socket_path);

    // Recovery: snapshot + WAL replay
    let mut state = MaterializedState::default();
    let mut replay_from = 0u64;
    if let Some(snapshot) = load_snapshot(&config.snapshot_path)? {
        replay_from = snapshot.seq;
        state = snapshot.state;
    }
    let mut wal = Wal::open(&config.wal_path)?;
    let replayed = wal.entries_after(replay_from)?;
    for entry in &replayed {
        state.apply_event(&entry.event);
    }
    info!(
        snapshot_seq = replay_from,
        replayed = replayed.len(),
        jobs = state.jobs.len(),
        streams = state.streams.len(),
        "state recovered",
    );

    let clock = SystemClock;
    let bus = Arc::new(Bus::new(Some(config.bus_dir.clone()), clock.clone()));
    declare_streams(&bus)?;

    let launcher = Arc::new(SubprocessLauncher::new());
    let host = Arc::new(
        PluginHost::new(clock.clone()).with_launcher(Arc::clone(&launcher) as Arc<dyn Launcher>),
    );

    // Discovery + launch. Events are collected and journaled once the
    // engine exists.
    let mut plugin_events: Vec<Event> = Vec::new();
    for discovered in discover_manifests(&config.plugins_dir)? {
        let manifest = discovered.manifest.clone();
        if let Err(e) = check_protocol(&manifest) {
            warn!(plugin = %manifest.id, error = %e, "plugin disabled at discovery");
            plugin_events.push(Event::PluginInstalled { manifest: manifest.clone() });
            plugin_events.push(Event::PluginHealthChanged {
                plugin_id: manifest.id.clone(),
                health: PluginHealth::Disabled,
            });
            continue;
        }
        // Prior configuration survives restarts via the state tables
        let plugin_config = state
            .plugins
            .get(&manifest.id)
            .map(|record| record.config.clone())
            .unwrap_or_default();

        let window = Arc::new(ErrorWindow::default());
        match launcher
            .launch(&manifest, &discovered.dir, &plugin_config, Arc::clone(&window))
            .await
        {
            Ok(api) => match host.register_with_window(
                manifest.clone(),
                plugin_config,
                api,
                Some(discovered.dir.clone()),
                window,
            ) {
                Ok(events) => plugin_events.extend(events),
                Err(e) => warn!(plugin = %manifest.id, error = %e, "registration failed"),
            },
            Err(e) => {
                warn!(plugin = %manifest.id, error = %e, "launch failed; plugin disabled");
                plugin_events.push(Event::PluginInstalled { manifest: manifest.clone() });
                plugin_events.push(Event::PluginHealthChanged {
                    plugin_id: manifest.id.clone(),
                    health: PluginHealth::Disabled,
                });
            }
        }
    }

    let engine = Arc::new(Engine::new(
        clock,
        EngineConfig::default(),
        Arc::new(Mutex::new(state)),
        wal,
        bus,
        host,
        config.snapshot_path.clone(),
    ));
    engine.record(plugin_events)?;
    engine.arm_maintenance_timers();

    let listener = UnixListener::bind(&config.socket_path)?;
    info!(socket = %config.socket_path.display(), "daemon ready");

    Ok(StartupResult {
        daemon: DaemonState {
            config,
            lock_file,
            engine,
            launcher,
            start_time: Instant::now(),
            started_at_utc: chrono::Utc::now(),
        },
        listener,
    })
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
