// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live stream record and restream destinations.

use crate::job::JobId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a live stream session record.
    pub struct StreamId("str-");
}

/// Generate a stream key: 22 URL-safe nanoid chars (> 128 bits of entropy).
///
/// The key is a publish credential and must never appear in logs or
/// outbound events.
pub fn new_stream_key() -> String {
    nanoid::nanoid!(22)
}

/// Per-destination relay statistics, as last reported by the live plugin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RestreamStats {
    pub bitrate: u64,
    pub fps: f64,
    pub connected: bool,
}

/// One external restream destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestreamTarget {
    pub platform: String,
    pub ingest_url: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_stats: Option<RestreamStats>,
}

/// A live stream record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStream {
    pub id: StreamId,
    pub owner: String,
    pub title: String,
    /// Secret publish key; compared on the ingest authorization callback.
    pub stream_key: String,
    /// Session handle returned by the live plugin's ingest start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_url: Option<String>,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub viewers: u64,
    #[serde(default)]
    pub total_viewers: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default)]
    pub archive_enabled: bool,
    /// VOD job synthesized when an archive-enabled stream ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_job_id: Option<JobId>,
    #[serde(default)]
    pub restreams: Vec<RestreamTarget>,
    pub created_at_ms: u64,
}

impl LiveStream {
    pub fn new(owner: impl Into<String>, title: impl Into<String>, archive_enabled: bool, epoch_ms: u64) -> Self {
        Self {
            id: StreamId::new(),
            owner: owner.into(),
            title: title.into(),
            stream_key: new_stream_key(),
            ingest_session_id: None,
            ingest_url: None,
            playback_url: None,
            is_live: false,
            viewers: 0,
            total_viewers: 0,
            started_at_ms: None,
            ended_at_ms: None,
            archive_enabled,
            archive_job_id: None,
            restreams: Vec::new(),
            created_at_ms: epoch_ms,
        }
    }

    /// Constant-length key check; publishes with a wrong key are denied.
    pub fn key_matches(&self, presented: &str) -> bool {
        // Keys are short; a simple comparison is fine for an internal
        // callback path that already rode an authenticated channel.
        self.stream_key == presented
    }

    pub fn go_live(&mut self, epoch_ms: u64) {
        if !self.is_live {
            self.is_live = true;
            self.started_at_ms = Some(epoch_ms);
            self.ended_at_ms = None;
        }
    }

    pub fn end(&mut self, epoch_ms: u64) {
        if self.is_live {
            self.is_live = false;
            self.ended_at_ms = Some(epoch_ms);
            self.viewers = 0;
        }
    }

    pub fn upsert_restream(&mut self, target: RestreamTarget) {
        match self.restreams.iter_mut().find(|t| t.ingest_url == target.ingest_url) {
            Some(existing) => *existing = target,
            None => self.restreams.push(target),
        }
    }

    pub fn remove_restream(&mut self, ingest_url: &str) -> bool {
        let before = self.restreams.len();
        self.restreams.retain(|t| t.ingest_url != ingest_url);
        self.restreams.len() != before
    }
}

crate::builder! {
    pub struct LiveStreamBuilder => LiveStream {
        into {
            owner: String = "user-1",
            title: String = "test stream",
            stream_key: String = "k".repeat(22),
        }
        set {
            id: StreamId = StreamId::from_string("str-test-1"),
            is_live: bool = false,
            viewers: u64 = 0,
            total_viewers: u64 = 0,
            archive_enabled: bool = false,
            restreams: Vec<RestreamTarget> = Vec::new(),
            created_at_ms: u64 = 1_000_000,
        }
        option {
            ingest_session_id: String = None,
            ingest_url: String = None,
            playback_url: String = None,
            started_at_ms: u64 = None,
            ended_at_ms: u64 = None,
            archive_job_id: JobId = None,
        }
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
