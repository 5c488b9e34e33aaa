// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess plugin launcher: spawn, handshake, contract wrapping.

use async_trait::async_trait;
use cf_plugin::contracts::{PluginApi, PluginError};
use cf_plugin::{wrap_client, ErrorWindow, Launcher, PluginProcess, RpcClient};
use cf_core::PluginManifest;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Launches plugin subprocesses with the daemon's magic cookie and keeps
/// their process handles so they can be stopped on shutdown.
pub struct SubprocessLauncher {
    cookie: String,
    processes: Mutex<Vec<PluginProcess>>,
}

impl SubprocessLauncher {
    /// Fresh random cookie per daemon run; plugins must echo it back.
    pub fn new() -> Self {
        Self { cookie: nanoid::nanoid!(32), processes: Mutex::new(Vec::new()) }
    }

    /// Stop every launched subprocess (SIGTERM, then SIGKILL).
    pub async fn stop_all(&self) {
        let processes: Vec<PluginProcess> = std::mem::take(&mut *self.processes.lock());
        for process in processes {
            process.stop().await;
        }
    }
}

impl Default for SubprocessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Launcher for SubprocessLauncher {
    async fn launch(
        &self,
        manifest: &PluginManifest,
        dir: &Path,
        config: &HashMap<String, String>,
        window: Arc<ErrorWindow>,
    ) -> Result<PluginApi, PluginError> {
        if manifest.command.is_empty() {
            return Err(PluginError::Handshake(format!(
                "plugin {} declares no launch command",
                manifest.id
            )));
        }

        let (process, pipes) =
            PluginProcess::spawn(&manifest.id, dir, &manifest.command, &manifest.args, &self.cookie)
                .map_err(|e| PluginError::Transport(e.to_string()))?;

        let client = RpcClient::connect(&manifest.id, pipes, &self.cookie, window)
            .await
            .map_err(|e| PluginError::Handshake(e.to_string()))?;

        // Hand the plugin its configuration; secret-reference values are
        // resolved by the plugin itself, never by the kernel.
        let _ = client
            .call(&cf_core::SystemClock, "configure", serde_json::json!({ "config": config }))
            .await?;

        info!(plugin = %manifest.id, "plugin launched and configured");
        self.processes.lock().push(process);
        Ok(wrap_client(manifest.plugin_type, client))
    }
}
