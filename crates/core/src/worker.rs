// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker fleet records.
//!
//! Workers are external stateless executors; the kernel only knows what
//! they report in heartbeats. IDs come from the fleet, so they are plain
//! strings rather than kernel-generated UUIDs.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Unique identifier for a worker instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    /// Create a new WorkerId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string value of this WorkerId.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for WorkerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for WorkerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for WorkerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Capabilities a worker declares in its heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerCaps {
    /// Video codecs the worker's encoder toolchain supports.
    pub codecs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
    /// How many tasks the worker will run concurrently.
    pub parallel_budget: u32,
}

impl Default for WorkerCaps {
    fn default() -> Self {
        Self { codecs: vec!["h264".to_string()], gpu: None, parallel_budget: 1 }
    }
}

/// A worker record, upserted on every heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub hostname: String,
    pub caps: WorkerCaps,
    pub last_heartbeat_ms: u64,
}

impl Worker {
    /// Healthy iff the last heartbeat is within the timeout window.
    pub fn is_healthy(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) < timeout_ms
    }
}

crate::builder! {
    pub struct WorkerBuilder => Worker {
        into {
            hostname: String = "node-a",
        }
        set {
            id: WorkerId = WorkerId::new("w1"),
            caps: WorkerCaps = WorkerCaps::default(),
            last_heartbeat_ms: u64 = 1_000_000,
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
