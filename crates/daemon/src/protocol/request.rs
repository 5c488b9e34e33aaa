// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use cf_core::{EncodeProfile, JobSource, PublishTarget};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request from a façade client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Get daemon status
    Status,

    /// Validate a bearer token through the auth plugin (fails closed)
    ValidateToken { raw: String, scheme: String },

    /// Authorization check through the auth plugin (fails closed)
    Authorize {
        user_id: String,
        action: String,
        resource_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource_id: Option<String>,
    },

    /// Request daemon shutdown
    Shutdown,

    // -- jobs --
    JobCreate {
        owner: String,
        source: JobSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile_inline: Option<EncodeProfile>,
        #[serde(default)]
        publish_targets: Vec<PublishTarget>,
        #[serde(default)]
        webhook_urls: Vec<String>,
    },

    JobCancel { id: String },

    /// Creates a fresh job with the same parameters
    JobRetry { id: String },

    JobGet { id: String },

    JobList,

    JobOutputs { id: String },

    /// Publish an existing artifact to one more platform
    PublishToPlatform { id: String, target: PublishTarget },

    // -- live streams --
    StreamCreate {
        owner: String,
        title: String,
        #[serde(default)]
        archive_enabled: bool,
    },

    StreamList,

    StreamStats { id: String },

    StreamEnd { id: String },

    /// Ingest authorization callback from the live plugin façade
    IngestAuth { id: String, stream_key: String },

    // -- restreams --
    RestreamCreate {
        stream_id: String,
        platform: String,
        /// Explicit ingest URL; omitted, the endpoint is acquired from
        /// the platform's publisher plugin.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ingest_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials_ref: Option<String>,
    },

    RestreamStart { stream_id: String, ingest_url: String },

    RestreamStop { stream_id: String, ingest_url: String },

    RestreamRemove { stream_id: String, ingest_url: String },

    // -- storage --
    BrowseStorage {
        scheme: String,
        path: String,
        #[serde(default)]
        show_hidden: bool,
        #[serde(default)]
        media_only: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search: Option<String>,
    },

    GetUploadUrl {
        scheme: String,
        bucket: String,
        key: String,
        expiry_secs: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
        method: String,
    },

    // -- plugin admin --
    /// Rescan the plugin directory and launch new plugins
    PluginInstall,

    PluginConfigure {
        plugin_id: String,
        /// Values for `*_ref` keys are opaque secret references
        config: HashMap<String, String>,
    },

    PluginEnable { plugin_id: String },

    PluginDisable { plugin_id: String },

    /// Shadow-upgrade a plugin from a staged directory
    PluginUpgrade { plugin_id: String, staged_dir: String },
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
