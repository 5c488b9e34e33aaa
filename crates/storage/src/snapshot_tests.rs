// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::MaterializedState;
use cf_core::test_support::queued_job;
use std::io::Write as _;

#[test]
fn roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.zst");

    let mut state = MaterializedState::default();
    let job = queued_job("job-abc");
    state.jobs.insert(job.id.to_string(), job);

    save_snapshot(&path, &state, 42).unwrap();
    let snapshot = load_snapshot(&path).unwrap().unwrap();
    assert_eq!(snapshot.seq, 42);
    assert!(snapshot.state.jobs.contains_key("job-abc"));
}

#[test]
fn missing_file_is_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_snapshot(&dir.path().join("nope.zst")).unwrap().is_none());
}

#[test]
fn corrupt_snapshot_rotates_to_bak() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.zst");
    {
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not a snapshot").unwrap();
    }

    assert!(load_snapshot(&path).unwrap().is_none());
    assert!(!path.exists());
    assert!(dir.path().join("snapshot.bak").exists());
}

#[test]
fn save_overwrites_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.zst");
    let state = MaterializedState::default();

    save_snapshot(&path, &state, 1).unwrap();
    save_snapshot(&path, &state, 2).unwrap();
    assert_eq!(load_snapshot(&path).unwrap().unwrap().seq, 2);
    assert!(!dir.path().join("snapshot.tmp").exists());
}

#[test]
fn bak_rotation_finds_free_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.zst");

    assert_eq!(rotate_bak_path(&path), dir.path().join("snapshot.bak"));
    std::fs::write(dir.path().join("snapshot.bak"), b"x").unwrap();
    assert_eq!(rotate_bak_path(&path), dir.path().join("snapshot.bak.1"));
}
