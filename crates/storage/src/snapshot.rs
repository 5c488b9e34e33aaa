// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! zstd-compressed state snapshots.
//!
//! A snapshot pairs the materialized state with the WAL sequence it
//! covers; recovery loads the snapshot and replays only newer entries.
//! Writes go through a temp file and an atomic rename; a snapshot that
//! fails to parse is rotated to `.bak` and recovery proceeds from an
//! empty state plus full WAL replay.

use crate::state::MaterializedState;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Compression level: fast, snapshots are small relative to media.
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk snapshot payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// Highest WAL sequence whose effects are included.
    pub seq: u64,
    pub state: MaterializedState,
}

/// Write a snapshot atomically (temp file + rename).
pub fn save_snapshot(path: &Path, state: &MaterializedState, seq: u64) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let snapshot = Snapshot { seq, state: state.clone() };
    let json = serde_json::to_vec(&snapshot)?;
    let compressed = zstd::encode_all(&json[..], ZSTD_LEVEL)?;

    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&compressed)?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a snapshot. Missing file → `None`; a corrupt file is rotated to
/// `.bak` and also yields `None` so recovery can fall back to the WAL.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut compressed = Vec::new();
    file.read_to_end(&mut compressed)?;

    let parsed = zstd::decode_all(&compressed[..])
        .map_err(SnapshotError::Io)
        .and_then(|json| serde_json::from_slice::<Snapshot>(&json).map_err(SnapshotError::Json));

    match parsed {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            let bak = rotate_bak_path(path);
            warn!(
                path = %path.display(),
                bak = %bak.display(),
                error = %e,
                "corrupt snapshot, rotating to .bak and recovering from WAL",
            );
            std::fs::rename(path, &bak)?;
            Ok(None)
        }
    }
}

/// Next free `.bak`/`.bak.N` sibling for rotating a damaged file aside.
pub fn rotate_bak_path(path: &Path) -> PathBuf {
    let base = path.with_extension("bak");
    if !base.exists() {
        return base;
    }
    for n in 1.. {
        let candidate = path.with_extension(format!("bak.{n}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("bak rotation exhausted")
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
