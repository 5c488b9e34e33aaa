// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin instance model: declared identity, capabilities, health.
//!
//! The kernel never knows what a plugin does, only what it claims to do.
//! Configuration values whose key matches the secret-reference convention
//! (`*_ref`, `*_secret_ref`) are opaque references resolved by the plugin
//! itself; [`redacted_config`] strips them from anything that leaves the
//! kernel (logs, audit records, outbound events).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// RPC protocol version spoken by this kernel.
pub const PROTOCOL_VERSION: u32 = 1;

/// The five capability contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginType {
    Auth,
    Storage,
    Encoder,
    Live,
    Publisher,
}

crate::simple_display! {
    PluginType {
        Auth => "auth",
        Storage => "storage",
        Encoder => "encoder",
        Live => "live",
        Publisher => "publisher",
    }
}

/// Health classification maintained by the host's probe loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginHealth {
    Starting,
    Healthy,
    /// RPC error rate above 5% over the last minute.
    Degraded,
    Restarting,
    /// Error rate above 10% sustained for two minutes, or process death.
    Failed,
    /// Requires an admin unblock; never restarted automatically.
    Disabled,
}

crate::simple_display! {
    PluginHealth {
        Starting => "starting",
        Healthy => "healthy",
        Degraded => "degraded",
        Restarting => "restarting",
        Failed => "failed",
        Disabled => "disabled",
    }
}

impl PluginHealth {
    /// Routable states: the router only ever picks Healthy instances,
    /// except auth which fails closed on anything else.
    pub fn is_routable(&self) -> bool {
        matches!(self, PluginHealth::Healthy)
    }
}

/// Declared capabilities, interpreted per plugin type by the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CapabilitySet {
    /// Encoder: supported video codecs.
    #[serde(default)]
    pub video_codecs: Vec<String>,
    /// Encoder: supported audio codecs.
    #[serde(default)]
    pub audio_codecs: Vec<String>,
    /// Encoder: reports hardware acceleration.
    #[serde(default)]
    pub gpu_accelerated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<String>,
    /// Storage: URL schemes served (`fs`, `s3`, `file`, `http`, `https`).
    #[serde(default)]
    pub url_schemes: Vec<String>,
    /// Publisher: target platform strings.
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Live: ingest protocols (`rtmp`, `srt`, `webrtc`).
    #[serde(default)]
    pub ingest_protocols: Vec<String>,
    /// Auth: token schemes accepted.
    #[serde(default)]
    pub auth_schemes: Vec<String>,
}

/// One declared configuration field (JSON-schema-shaped, flattened).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    pub name: String,
    /// `string`, `int`, `bool`, or `secret_ref`.
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Manifest a plugin declares in its directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    pub protocol_version: u32,
    #[serde(default)]
    pub supported_kernel_versions: Vec<String>,
    #[serde(default)]
    pub capabilities: CapabilitySet,
    #[serde(default)]
    pub config_schema: Vec<ConfigField>,
    /// Launch command for subprocess isolation, relative to the plugin
    /// directory. Empty for instances registered in-process.
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Secret-reference naming convention.
pub fn is_secret_ref_key(key: &str) -> bool {
    key.ends_with("_ref")
}

/// Copy of a config map with secret-reference entries removed.
///
/// Reference identifiers stay in the config store; they do not ride along
/// on logs, audit records, or outbound events.
pub fn redacted_config(config: &HashMap<String, String>) -> HashMap<String, String> {
    config
        .iter()
        .filter(|(k, _)| !is_secret_ref_key(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Validate concrete config values against a declared schema.
///
/// Returns the names of missing required fields and undeclared extras.
pub fn validate_config(
    schema: &[ConfigField],
    config: &HashMap<String, String>,
) -> Result<(), ConfigError> {
    let mut missing = Vec::new();
    for field in schema {
        if field.required && !config.contains_key(&field.name) {
            missing.push(field.name.clone());
        }
    }
    let declared: Vec<&str> = schema.iter().map(|f| f.name.as_str()).collect();
    let unknown: Vec<String> = config
        .keys()
        .filter(|k| !declared.contains(&k.as_str()))
        .cloned()
        .collect();
    if missing.is_empty() && unknown.is_empty() {
        Ok(())
    } else {
        Err(ConfigError { missing, unknown })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("config mismatch (missing: {missing:?}, unknown: {unknown:?})")]
pub struct ConfigError {
    pub missing: Vec<String>,
    pub unknown: Vec<String>,
}

#[cfg(test)]
#[path = "plugin_tests.rs"]
mod tests;
