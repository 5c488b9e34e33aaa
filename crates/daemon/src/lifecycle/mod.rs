// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, recovery, reconciliation.

mod reconcile;
mod startup;

pub use reconcile::reconcile;
pub use startup::{startup, StartupResult};

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use cf_core::SystemClock;
use cf_engine::Engine;
use thiserror::Error;

/// Daemon engine with the concrete production clock.
pub type DaemonEngine = Engine<SystemClock>;

/// Daemon configuration paths.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/castforge)
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Path to WAL file
    pub wal_path: PathBuf,
    /// Path to snapshot file
    pub snapshot_path: PathBuf,
    /// Directory for bus stream journals
    pub bus_dir: PathBuf,
    /// Directory scanned for plugin manifests
    pub plugins_dir: PathBuf,
}

impl Config {
    /// Fixed paths under `$XDG_STATE_HOME/castforge` (or the home
    /// fallback). One daemon per user.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = state_dir()?;
        Ok(Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            wal_path: state_dir.join("wal").join("events.wal"),
            snapshot_path: state_dir.join("snapshot.zst"),
            bus_dir: state_dir.join("bus"),
            plugins_dir: state_dir.join("plugins"),
            state_dir,
        })
    }

    /// All paths rooted in an explicit directory (tests).
    pub fn rooted(state_dir: PathBuf) -> Self {
        Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            wal_path: state_dir.join("wal").join("events.wal"),
            snapshot_path: state_dir.join("snapshot.zst"),
            bus_dir: state_dir.join("bus"),
            plugins_dir: state_dir.join("plugins"),
            state_dir,
        }
    }
}

fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Some(dir) = dirs::state_dir() {
        return Ok(dir.join("castforge"));
    }
    dirs::home_dir()
        .map(|home| home.join(".local").join("state").join("castforge"))
        .ok_or(LifecycleError::NoStateDir)
}

/// Daemon state during operation.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): held to maintain the exclusive PID lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub engine: Arc<DaemonEngine>,
    pub launcher: Arc<crate::launcher::SubprocessLauncher>,
    pub start_time: Instant,
    pub started_at_utc: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no usable state directory")]
    NoStateDir,
    #[error("another daemon instance holds the lock at {0}")]
    AlreadyRunning(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wal(#[from] cf_storage::WalError),
    #[error(transparent)]
    Snapshot(#[from] cf_storage::SnapshotError),
    #[error(transparent)]
    Bus(#[from] cf_bus::BusError),
    #[error(transparent)]
    Engine(#[from] cf_engine::EngineError),
    #[error(transparent)]
    Manifest(#[from] cf_plugin::ManifestError),
}
