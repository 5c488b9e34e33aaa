// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cf-storage: durable state for the kernel.
//!
//! Kernel events are journaled to a JSONL write-ahead log before their
//! effects are observable; crash recovery is snapshot load + WAL replay.
//! The job and task tables materialized here are the source of truth;
//! every other view (bus fan-out, caches) is derived.

mod snapshot;
mod state;
mod wal;

pub use snapshot::{load_snapshot, rotate_bak_path, save_snapshot, Snapshot, SnapshotError};
pub use state::{MaterializedState, PluginRecord};
pub use wal::{Wal, WalEntry, WalError};
