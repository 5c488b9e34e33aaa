// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin registry event handlers.

use cf_core::{Event, PluginHealth, PluginManifest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::MaterializedState;

/// Persisted view of a plugin instance. The process handle lives in the
/// host; destroying and recreating it does not touch this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub manifest: PluginManifest,
    /// Bound configuration. Secret-reference values live here and are
    /// stripped by redaction before any outbound surface.
    #[serde(default)]
    pub config: HashMap<String, String>,
    pub health: PluginHealth,
    #[serde(default)]
    pub consecutive_restarts: u32,
}

impl PluginRecord {
    pub fn new(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            config: HashMap::new(),
            health: PluginHealth::Starting,
            consecutive_restarts: 0,
        }
    }
}

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::PluginInstalled { manifest } => {
            // Upgrade replays replace the manifest but keep config/health
            match state.plugins.get_mut(&manifest.id) {
                Some(record) => record.manifest = manifest.clone(),
                None => {
                    state
                        .plugins
                        .insert(manifest.id.clone(), PluginRecord::new(manifest.clone()));
                }
            }
        }

        Event::PluginConfigured { plugin_id, config } => {
            if let Some(record) = state.plugins.get_mut(plugin_id) {
                record.config = config.clone();
            }
        }

        Event::PluginHealthChanged { plugin_id, health } => {
            if let Some(record) = state.plugins.get_mut(plugin_id) {
                record.health = *health;
                if *health == PluginHealth::Healthy {
                    record.consecutive_restarts = 0;
                }
            }
        }

        Event::PluginRemoved { plugin_id } => {
            state.plugins.remove(plugin_id);
        }

        _ => {}
    }
}
