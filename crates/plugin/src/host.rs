// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kernel-owned plugin registry, routing, health loop, shadow upgrade.
//!
//! Routing rules are pure functions over the request and the registry.
//! The registry has explicit init/teardown and no process-global state;
//! secrets traverse it by reference only.

use crate::contracts::{
    AuthPlugin, EncoderPlugin, LivePlugin, PluginApi, PluginError, PublisherPlugin, StoragePlugin,
};
use crate::health::{ErrorWindow, DEGRADE_WINDOW_MS, MAX_CONSECUTIVE_RESTARTS};
use async_trait::async_trait;
use cf_core::{
    validate_config, Backoff, Clock, Event, PluginHealth, PluginManifest, PluginType,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Shadow-upgrade monitoring period after the traffic flip.
pub const SHADOW_WATCH_MS: u64 = 300_000;
/// Error-rate regression that triggers rollback during the watch.
pub const SHADOW_REGRESSION_RATE: f64 = 0.05;

/// Launches a plugin instance from its manifest (subprocess + handshake
/// in production; fakes in tests). The passed window is shared with the
/// instance's RPC client so call outcomes feed health classification.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(
        &self,
        manifest: &PluginManifest,
        dir: &Path,
        config: &HashMap<String, String>,
        window: Arc<ErrorWindow>,
    ) -> Result<PluginApi, PluginError>;
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no storage plugin for scheme {0:?}")]
    NoStorageForScheme(String),
    #[error("no healthy encoder for codec {0:?}")]
    NoEncoderForCodec(String),
    #[error("no publisher for platform {0:?}")]
    NoPublisherForPlatform(String),
    #[error("no live plugin for protocol {0:?}")]
    NoLiveForProtocol(String),
    /// Auth fails closed: anything but Healthy denies.
    #[error("auth plugin unavailable")]
    AuthUnavailable,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("plugin {0:?} is not registered")]
    Unknown(String),
    #[error("config rejected: {0}")]
    Config(#[from] cf_core::plugin::ConfigError),
    #[error("manifest rejected: {0}")]
    Manifest(#[from] crate::manifest::ManifestError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

struct Entry {
    manifest: PluginManifest,
    config: HashMap<String, String>,
    health: PluginHealth,
    api: PluginApi,
    window: Arc<ErrorWindow>,
    dir: Option<PathBuf>,
    consecutive_restarts: u32,
    /// Epoch-ms deadline for the next restart attempt while Restarting.
    restart_due_ms: Option<u64>,
}

struct ShadowWatch {
    plugin_id: String,
    prior_manifest: PluginManifest,
    prior_api: PluginApi,
    prior_window: Arc<ErrorWindow>,
    started_at_ms: u64,
}

#[derive(Default)]
struct HostInner {
    entries: HashMap<String, Entry>,
    shadows: Vec<ShadowWatch>,
    rr_encoder: usize,
}

/// The plugin federation host.
pub struct PluginHost<C: Clock> {
    clock: C,
    launcher: Option<Arc<dyn Launcher>>,
    restart_backoff: Backoff,
    inner: Mutex<HostInner>,
}

impl<C: Clock> PluginHost<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            launcher: None,
            restart_backoff: Backoff::with_max_attempts(MAX_CONSECUTIVE_RESTARTS),
            inner: Mutex::new(HostInner::default()),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Register a live instance. Config is validated against the declared
    /// schema; the returned events carry the registration for the WAL.
    pub fn register(
        &self,
        manifest: PluginManifest,
        config: HashMap<String, String>,
        api: PluginApi,
        dir: Option<PathBuf>,
    ) -> Result<Vec<Event>, HostError> {
        self.register_with_window(manifest, config, api, dir, Arc::new(ErrorWindow::default()))
    }

    /// Register with an externally created error window (the launcher
    /// shares it with the instance's RPC client).
    pub fn register_with_window(
        &self,
        manifest: PluginManifest,
        config: HashMap<String, String>,
        api: PluginApi,
        dir: Option<PathBuf>,
        window: Arc<ErrorWindow>,
    ) -> Result<Vec<Event>, HostError> {
        crate::manifest::check_protocol(&manifest)?;
        validate_config(&manifest.config_schema, &config)?;

        let events = vec![
            Event::PluginInstalled { manifest: manifest.clone() },
            Event::PluginConfigured { plugin_id: manifest.id.clone(), config: config.clone() },
            Event::PluginHealthChanged {
                plugin_id: manifest.id.clone(),
                health: PluginHealth::Healthy,
            },
        ];

        info!(plugin = %manifest.id, kind = %manifest.plugin_type, "plugin registered");
        self.inner.lock().entries.insert(
            manifest.id.clone(),
            Entry {
                config,
                health: PluginHealth::Healthy,
                window,
                api,
                dir,
                consecutive_restarts: 0,
                restart_due_ms: None,
                manifest,
            },
        );
        Ok(events)
    }

    /// Remove an instance entirely (admin uninstall).
    pub fn remove(&self, plugin_id: &str) -> Result<Vec<Event>, HostError> {
        let mut inner = self.inner.lock();
        inner
            .entries
            .remove(plugin_id)
            .ok_or_else(|| HostError::Unknown(plugin_id.to_string()))?;
        inner.shadows.retain(|w| w.plugin_id != plugin_id);
        Ok(vec![Event::PluginRemoved { plugin_id: plugin_id.to_string() }])
    }

    /// Rebind configuration (admin). Takes effect immediately for
    /// routing and on the next (re)launch for the subprocess itself.
    pub fn configure(
        &self,
        plugin_id: &str,
        config: HashMap<String, String>,
    ) -> Result<Vec<Event>, HostError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .get_mut(plugin_id)
            .ok_or_else(|| HostError::Unknown(plugin_id.to_string()))?;
        validate_config(&entry.manifest.config_schema, &config)?;
        entry.config = config.clone();
        Ok(vec![Event::PluginConfigured { plugin_id: plugin_id.to_string(), config }])
    }

    /// Admin unblock: Disabled → Healthy with a clean slate.
    pub fn enable(&self, plugin_id: &str) -> Result<Vec<Event>, HostError> {
        self.set_health(plugin_id, PluginHealth::Healthy, true)
    }

    /// Admin disable; the instance is never routed to and never restarted.
    pub fn disable(&self, plugin_id: &str) -> Result<Vec<Event>, HostError> {
        self.set_health(plugin_id, PluginHealth::Disabled, false)
    }

    fn set_health(
        &self,
        plugin_id: &str,
        health: PluginHealth,
        reset: bool,
    ) -> Result<Vec<Event>, HostError> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .get_mut(plugin_id)
            .ok_or_else(|| HostError::Unknown(plugin_id.to_string()))?;
        entry.health = health;
        if reset {
            entry.window.reset();
            entry.consecutive_restarts = 0;
            entry.restart_due_ms = None;
        }
        Ok(vec![Event::PluginHealthChanged { plugin_id: plugin_id.to_string(), health }])
    }

    pub fn health_of(&self, plugin_id: &str) -> Option<PluginHealth> {
        self.inner.lock().entries.get(plugin_id).map(|e| e.health)
    }

    /// The shared error window of an instance (RPC clients record into it).
    pub fn window_of(&self, plugin_id: &str) -> Option<Arc<ErrorWindow>> {
        self.inner.lock().entries.get(plugin_id).map(|e| Arc::clone(&e.window))
    }

    // --- routing -----------------------------------------------------------

    /// Auth is singleton per deployment and fails closed.
    pub fn auth(&self) -> Result<Arc<dyn AuthPlugin>, RouteError> {
        let inner = self.inner.lock();
        let entry = inner
            .entries
            .values()
            .find(|e| e.manifest.plugin_type == PluginType::Auth)
            .ok_or(RouteError::AuthUnavailable)?;
        if !entry.health.is_routable() {
            return Err(RouteError::AuthUnavailable);
        }
        match &entry.api {
            PluginApi::Auth(api) => Ok(Arc::clone(api)),
            _ => Err(RouteError::AuthUnavailable),
        }
    }

    /// Storage routing by URL scheme (`fs://`, `s3://`, `file://`,
    /// `http(s)://`).
    pub fn storage_for_url(&self, url: &str) -> Result<Arc<dyn StoragePlugin>, RouteError> {
        let scheme = url.split("://").next().unwrap_or("").to_ascii_lowercase();
        self.storage_for_scheme(&scheme)
    }

    pub fn storage_for_scheme(&self, scheme: &str) -> Result<Arc<dyn StoragePlugin>, RouteError> {
        let inner = self.inner.lock();
        for entry in inner.entries.values() {
            if entry.manifest.plugin_type != PluginType::Storage || !entry.health.is_routable() {
                continue;
            }
            if entry.manifest.capabilities.url_schemes.iter().any(|s| s == scheme) {
                if let PluginApi::Storage(api) = &entry.api {
                    return Ok(Arc::clone(api));
                }
            }
        }
        Err(RouteError::NoStorageForScheme(scheme.to_string()))
    }

    /// Encoder routing by codec capability and GPU preference; ties are
    /// broken round-robin.
    pub fn encoder_for(
        &self,
        codec: &str,
        prefer_gpu: bool,
    ) -> Result<Arc<dyn EncoderPlugin>, RouteError> {
        let mut inner = self.inner.lock();
        let mut eligible: Vec<(String, bool)> = inner
            .entries
            .values()
            .filter(|e| {
                e.manifest.plugin_type == PluginType::Encoder
                    && e.health.is_routable()
                    && e.manifest.capabilities.video_codecs.iter().any(|c| c == codec)
            })
            .map(|e| (e.manifest.id.clone(), e.manifest.capabilities.gpu_accelerated))
            .collect();
        eligible.sort_by(|a, b| a.0.cmp(&b.0));

        if eligible.is_empty() {
            return Err(RouteError::NoEncoderForCodec(codec.to_string()));
        }
        if prefer_gpu && eligible.iter().any(|(_, gpu)| *gpu) {
            eligible.retain(|(_, gpu)| *gpu);
        }

        let pick = inner.rr_encoder % eligible.len();
        inner.rr_encoder = inner.rr_encoder.wrapping_add(1);
        let id = eligible[pick].0.clone();
        match &inner.entries[&id].api {
            PluginApi::Encoder(api) => Ok(Arc::clone(api)),
            _ => Err(RouteError::NoEncoderForCodec(codec.to_string())),
        }
    }

    /// One publisher per declared target platform.
    pub fn publisher_for(&self, platform: &str) -> Result<Arc<dyn PublisherPlugin>, RouteError> {
        let inner = self.inner.lock();
        for entry in inner.entries.values() {
            if entry.manifest.plugin_type != PluginType::Publisher || !entry.health.is_routable() {
                continue;
            }
            if entry.manifest.capabilities.platforms.iter().any(|p| p == platform) {
                if let PluginApi::Publisher(api) = &entry.api {
                    return Ok(Arc::clone(api));
                }
            }
        }
        Err(RouteError::NoPublisherForPlatform(platform.to_string()))
    }

    /// Live routing by ingest protocol (`rtmp`, `srt`, `webrtc`).
    pub fn live_for(&self, protocol: &str) -> Result<Arc<dyn LivePlugin>, RouteError> {
        let inner = self.inner.lock();
        for entry in inner.entries.values() {
            if entry.manifest.plugin_type != PluginType::Live || !entry.health.is_routable() {
                continue;
            }
            if entry.manifest.capabilities.ingest_protocols.iter().any(|p| p == protocol) {
                if let PluginApi::Live(api) = &entry.api {
                    return Ok(Arc::clone(api));
                }
            }
        }
        Err(RouteError::NoLiveForProtocol(protocol.to_string()))
    }

    // --- health loop -------------------------------------------------------

    /// Run one liveness probe round, recording outcomes into each
    /// instance's error window.
    pub async fn probe_all(&self) {
        let targets: Vec<(PluginApi, Arc<ErrorWindow>)> = {
            let inner = self.inner.lock();
            inner
                .entries
                .values()
                .filter(|e| e.health != PluginHealth::Disabled)
                .map(|e| (e.api.clone(), Arc::clone(&e.window)))
                .collect()
        };
        for (api, window) in targets {
            let ok = api.ping().await.is_ok();
            window.record(self.clock.epoch_ms(), ok);
        }
    }

    /// Classify every instance and drive the restart ladder. Returns
    /// health-change events for the WAL.
    pub async fn tick_health(&self) -> Vec<Event> {
        let now_ms = self.clock.epoch_ms();
        let mut events = Vec::new();
        let mut restarts: Vec<String> = Vec::new();

        {
            let mut inner = self.inner.lock();
            for entry in inner.entries.values_mut() {
                match entry.health {
                    PluginHealth::Disabled => continue,
                    PluginHealth::Restarting => {
                        if entry.restart_due_ms.is_some_and(|due| now_ms >= due) {
                            restarts.push(entry.manifest.id.clone());
                        }
                        continue;
                    }
                    _ => {}
                }

                let classified = entry.window.classify(now_ms);
                if classified == entry.health {
                    continue;
                }
                match classified {
                    PluginHealth::Failed => {
                        let delay =
                            self.restart_backoff.delay(entry.consecutive_restarts + 1);
                        entry.health = PluginHealth::Restarting;
                        entry.restart_due_ms = Some(now_ms + delay.as_millis() as u64);
                        warn!(
                            plugin = %entry.manifest.id,
                            delay_ms = delay.as_millis() as u64,
                            "plugin failed, restart scheduled",
                        );
                        events.push(Event::PluginHealthChanged {
                            plugin_id: entry.manifest.id.clone(),
                            health: PluginHealth::Restarting,
                        });
                    }
                    health => {
                        entry.health = health;
                        events.push(Event::PluginHealthChanged {
                            plugin_id: entry.manifest.id.clone(),
                            health,
                        });
                    }
                }
            }
        }

        for plugin_id in restarts {
            events.extend(self.attempt_restart(&plugin_id).await);
        }
        events.extend(self.check_shadows(now_ms));
        events
    }

    async fn attempt_restart(&self, plugin_id: &str) -> Vec<Event> {
        let (manifest, dir, config, attempts, window) = {
            let inner = self.inner.lock();
            match inner.entries.get(plugin_id) {
                Some(e) => (
                    e.manifest.clone(),
                    e.dir.clone(),
                    e.config.clone(),
                    e.consecutive_restarts,
                    Arc::clone(&e.window),
                ),
                None => return Vec::new(),
            }
        };

        let relaunched = match (&self.launcher, dir.as_deref()) {
            (Some(launcher), Some(dir)) => {
                launcher.launch(&manifest, dir, &config, window).await.ok()
            }
            // No launcher (in-process instances): a restart is a clean
            // slate on the existing instance.
            _ => None,
        };

        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get_mut(plugin_id) else {
            return Vec::new();
        };

        let launchable = self.launcher.is_some() && entry.dir.is_some();
        let recovered = if launchable {
            match relaunched {
                Some(api) => {
                    entry.api = api;
                    true
                }
                None => false,
            }
        } else {
            true
        };

        if recovered {
            entry.window.reset();
            entry.health = PluginHealth::Healthy;
            entry.consecutive_restarts = 0;
            entry.restart_due_ms = None;
            info!(plugin = %plugin_id, "plugin restarted");
            vec![Event::PluginHealthChanged {
                plugin_id: plugin_id.to_string(),
                health: PluginHealth::Healthy,
            }]
        } else {
            entry.consecutive_restarts = attempts + 1;
            if entry.consecutive_restarts >= MAX_CONSECUTIVE_RESTARTS {
                entry.health = PluginHealth::Disabled;
                entry.restart_due_ms = None;
                warn!(plugin = %plugin_id, "restart ladder exhausted, disabling");
                vec![Event::PluginHealthChanged {
                    plugin_id: plugin_id.to_string(),
                    health: PluginHealth::Disabled,
                }]
            } else {
                let delay = self.restart_backoff.delay(entry.consecutive_restarts + 1);
                entry.restart_due_ms =
                    Some(self.clock.epoch_ms() + delay.as_millis() as u64);
                Vec::new()
            }
        }
    }

    // --- shadow upgrade ----------------------------------------------------

    /// Start a new instance alongside the prior one, self-test it, flip
    /// traffic atomically, then monitor for five minutes. A failed
    /// self-test leaves the prior instance untouched.
    pub async fn shadow_upgrade(
        &self,
        plugin_id: &str,
        new_manifest: PluginManifest,
        new_api: PluginApi,
    ) -> Result<Vec<Event>, HostError> {
        self.shadow_upgrade_with_window(
            plugin_id,
            new_manifest,
            new_api,
            Arc::new(ErrorWindow::default()),
        )
        .await
    }

    /// Shadow upgrade with the new instance's shared error window (the
    /// launcher wires it into the RPC client).
    pub async fn shadow_upgrade_with_window(
        &self,
        plugin_id: &str,
        new_manifest: PluginManifest,
        new_api: PluginApi,
        new_window: Arc<ErrorWindow>,
    ) -> Result<Vec<Event>, HostError> {
        crate::manifest::check_protocol(&new_manifest)?;
        new_api.ping().await?;

        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .get_mut(plugin_id)
            .ok_or_else(|| HostError::Unknown(plugin_id.to_string()))?;

        let prior_manifest = std::mem::replace(&mut entry.manifest, new_manifest.clone());
        let prior_api = std::mem::replace(&mut entry.api, new_api);
        let prior_window = std::mem::replace(&mut entry.window, new_window);
        entry.health = PluginHealth::Healthy;

        inner.shadows.push(ShadowWatch {
            plugin_id: plugin_id.to_string(),
            prior_manifest,
            prior_api,
            prior_window,
            started_at_ms: now_ms,
        });

        info!(plugin = %plugin_id, "shadow upgrade flipped traffic");
        Ok(vec![
            Event::PluginInstalled { manifest: new_manifest },
            Event::PluginHealthChanged {
                plugin_id: plugin_id.to_string(),
                health: PluginHealth::Healthy,
            },
        ])
    }

    /// Resolve shadow watches: roll back on regression, retire after the
    /// monitoring period.
    pub fn check_shadows(&self, now_ms: u64) -> Vec<Event> {
        let mut events = Vec::new();
        let mut inner = self.inner.lock();
        let HostInner { entries, shadows, .. } = &mut *inner;

        shadows.retain_mut(|watch| {
            let Some(entry) = entries.get_mut(&watch.plugin_id) else {
                return false;
            };
            let (rate, samples) = entry.window.error_rate(now_ms, DEGRADE_WINDOW_MS);
            let regressed = samples >= 5 && rate > SHADOW_REGRESSION_RATE;

            if regressed {
                warn!(plugin = %watch.plugin_id, rate, "shadow upgrade regressed, rolling back");
                entry.manifest = watch.prior_manifest.clone();
                entry.api = watch.prior_api.clone();
                entry.window = Arc::clone(&watch.prior_window);
                entry.window.reset();
                entry.health = PluginHealth::Healthy;
                events.push(Event::PluginInstalled { manifest: watch.prior_manifest.clone() });
                events.push(Event::PluginHealthChanged {
                    plugin_id: watch.plugin_id.clone(),
                    health: PluginHealth::Healthy,
                });
                return false;
            }
            now_ms.saturating_sub(watch.started_at_ms) < SHADOW_WATCH_MS
        });
        events
    }

    /// Snapshot of `(id, type, health)` for status queries.
    pub fn statuses(&self) -> Vec<(String, PluginType, PluginHealth)> {
        let inner = self.inner.lock();
        let mut out: Vec<_> = inner
            .entries
            .values()
            .map(|e| (e.manifest.id.clone(), e.manifest.plugin_type, e.health))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Tear down the registry (graceful shutdown).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.shadows.clear();
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
