// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted fake plugins for tests (behind `test-support`).
//!
//! Each fake implements its full contract in memory and can be scripted
//! to fail, so engine and host tests run without subprocesses.

use crate::contracts::*;
use async_trait::async_trait;
use cf_core::{CapabilitySet, PluginManifest, PluginType, PROTOCOL_VERSION};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Manifest helper for registering fakes with a host.
pub fn manifest(id: &str, plugin_type: PluginType, caps: CapabilitySet) -> PluginManifest {
    PluginManifest {
        id: id.to_string(),
        plugin_type,
        protocol_version: PROTOCOL_VERSION,
        supported_kernel_versions: vec!["0.3".to_string()],
        capabilities: caps,
        config_schema: Vec::new(),
        command: String::new(),
        args: Vec::new(),
    }
}

// ---------------------------------------------------------------------------

/// Auth fake: role map + allow/deny scripting.
#[derive(Default)]
pub struct FakeAuth {
    pub deny_all: AtomicBool,
    pub unhealthy: AtomicBool,
    /// user_id → role
    pub roles: Mutex<HashMap<String, String>>,
}

impl FakeAuth {
    pub fn with_user(self, user_id: &str, role: &str) -> Self {
        self.roles.lock().insert(user_id.to_string(), role.to_string());
        self
    }
}

#[async_trait]
impl AuthPlugin for FakeAuth {
    async fn validate_token(&self, raw: &str, _scheme: &str) -> Result<TokenIdentity, PluginError> {
        let user_id = raw.strip_prefix("token:").unwrap_or(raw).to_string();
        let role = self.roles.lock().get(&user_id).cloned();
        Ok(TokenIdentity {
            valid: role.is_some(),
            username: user_id.clone(),
            email: format!("{user_id}@example.com"),
            role: role.clone().unwrap_or_default(),
            roles: role.into_iter().collect(),
            expires_at_ms: None,
            metadata: HashMap::new(),
            user_id,
        })
    }

    async fn authorize(
        &self,
        user_id: &str,
        action: &str,
        resource_type: &str,
        _resource_id: Option<&str>,
    ) -> Result<AuthzDecision, PluginError> {
        if self.deny_all.load(Ordering::Relaxed) {
            return Ok(AuthzDecision { allowed: false, reason: "denied by policy".into() });
        }
        // Pure in (role, action, resource_type): admins do anything,
        // users touch their own jobs and streams.
        let role = self.roles.lock().get(user_id).cloned().unwrap_or_default();
        let allowed = match role.as_str() {
            "admin" => true,
            "user" => matches!(resource_type, "job" | "stream") && action != "admin",
            _ => false,
        };
        Ok(AuthzDecision { allowed, reason: String::new() })
    }

    async fn get_user(&self, id: &str) -> Result<UserRecord, PluginError> {
        let role = self.roles.lock().get(id).cloned().ok_or_else(|| PluginError::Remote {
            code: "AUTH-404".into(),
            message: format!("no user {id}"),
        })?;
        Ok(UserRecord {
            id: id.to_string(),
            username: id.to_string(),
            email: format!("{id}@example.com"),
            role: role.clone(),
            roles: vec![role],
        })
    }

    async fn list_users(
        &self,
        page: u32,
        page_size: u32,
        role_filter: Option<&str>,
    ) -> Result<UserPage, PluginError> {
        let roles = self.roles.lock();
        let mut users: Vec<UserRecord> = roles
            .iter()
            .filter(|(_, role)| role_filter.is_none_or(|f| f == role.as_str()))
            .map(|(id, role)| UserRecord {
                id: id.clone(),
                username: id.clone(),
                email: format!("{id}@example.com"),
                role: role.clone(),
                roles: vec![role.clone()],
            })
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        let total = users.len() as u64;
        let start = (page as usize) * (page_size as usize);
        let users = users.into_iter().skip(start).take(page_size as usize).collect();
        Ok(UserPage { users, page, page_size, total })
    }

    async fn refresh_token(&self, refresh: &str) -> Result<TokenIdentity, PluginError> {
        self.validate_token(refresh, "refresh").await
    }

    async fn logout(&self, _user_id: &str, _all_sessions: bool) -> Result<(), PluginError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), PluginError> {
        if self.unhealthy.load(Ordering::Relaxed) {
            Err(PluginError::Transport("unhealthy".into()))
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------

/// In-memory object store.
#[derive(Default)]
pub struct FakeStorage {
    pub objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    pub fail_uploads: AtomicBool,
}

#[async_trait]
impl StoragePlugin for FakeStorage {
    async fn upload(
        &self,
        meta: ObjectMeta,
        mut data: mpsc::Receiver<Vec<u8>>,
    ) -> Result<UploadReceipt, PluginError> {
        if self.fail_uploads.load(Ordering::Relaxed) {
            return Err(PluginError::Remote { code: "STOR-001".into(), message: "disk full".into() });
        }
        let mut bytes = Vec::new();
        while let Some(chunk) = data.recv().await {
            bytes.extend_from_slice(&chunk);
        }
        let size = bytes.len() as u64;
        let url = format!("fs://{}/{}", meta.bucket, meta.key);
        self.objects.lock().insert((meta.bucket, meta.key), bytes);
        Ok(UploadReceipt { url, size, etag: format!("etag-{size}") })
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<ProbeStream, PluginError> {
        let bytes = self
            .objects
            .lock()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| PluginError::Remote {
                code: "STOR-404".into(),
                message: format!("no object {bucket}/{path}"),
            })?;
        let meta = ObjectMeta {
            bucket: bucket.to_string(),
            key: path.to_string(),
            size: bytes.len() as u64,
            content_type: None,
            etag: None,
            modified_at_ms: None,
        };
        let (tx, chunks) = mpsc::channel(4);
        tokio::spawn(async move {
            let _ = tx.send(bytes).await;
        });
        Ok(ProbeStream { meta, chunks })
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<(), PluginError> {
        self.objects.lock().remove(&(bucket.to_string(), path.to_string()));
        Ok(())
    }

    async fn get_url(&self, bucket: &str, key: &str) -> Result<String, PluginError> {
        Ok(format!("fs://{bucket}/{key}"))
    }

    async fn get_upload_url(
        &self,
        bucket: &str,
        key: &str,
        expiry_secs: u64,
        content_type: Option<&str>,
        method: &str,
    ) -> Result<SignedUrl, PluginError> {
        let mut headers = HashMap::new();
        if let Some(ct) = content_type {
            headers.insert("content-type".to_string(), ct.to_string());
        }
        Ok(SignedUrl {
            url: format!("fs://{bucket}/{key}?method={method}"),
            headers,
            expires_at_ms: expiry_secs * 1_000,
        })
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        _delimiter: Option<&str>,
        max_keys: u32,
        _continuation: Option<&str>,
    ) -> Result<ObjectList, PluginError> {
        let objects = self.objects.lock();
        let mut entries: Vec<ObjectEntry> = objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), v)| ObjectEntry { key: k.clone(), size: v.len() as u64, modified_at_ms: None })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries.truncate(max_keys as usize);
        Ok(ObjectList { objects: entries, common_prefixes: Vec::new(), continuation: None })
    }

    async fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMeta, PluginError> {
        let objects = self.objects.lock();
        let bytes = objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| PluginError::Remote {
                code: "STOR-404".into(),
                message: format!("no object {bucket}/{key}"),
            })?;
        Ok(ObjectMeta {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: bytes.len() as u64,
            content_type: None,
            etag: None,
            modified_at_ms: None,
        })
    }

    async fn get_capabilities(&self) -> Result<StorageCaps, PluginError> {
        Ok(StorageCaps { schemes: vec!["fs".to_string()], supports_signed_urls: true })
    }

    async fn browse_roots(&self) -> Result<Vec<BrowseEntry>, PluginError> {
        Ok(vec![BrowseEntry {
            name: "media".to_string(),
            path: "/media".to_string(),
            is_dir: true,
            size: 0,
            is_media: false,
        }])
    }

    async fn browse(
        &self,
        path: &str,
        _show_hidden: bool,
        media_only: bool,
        search_query: Option<&str>,
    ) -> Result<Vec<BrowseEntry>, PluginError> {
        let objects = self.objects.lock();
        let mut entries: Vec<BrowseEntry> = objects
            .keys()
            .filter(|(_, k)| k.starts_with(path.trim_start_matches('/')))
            .map(|(_, k)| BrowseEntry {
                name: k.rsplit('/').next().unwrap_or(k).to_string(),
                path: k.clone(),
                is_dir: false,
                size: 0,
                is_media: k.ends_with(".mp4") || k.ends_with(".ts") || k.ends_with(".mkv"),
            })
            .collect();
        if media_only {
            entries.retain(|e| e.is_media);
        }
        if let Some(q) = search_query {
            entries.retain(|e| e.name.contains(q));
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------

/// Encoder fake: configurable probe and scripted transcode outcomes.
pub struct FakeEncoder {
    pub caps: EncoderCaps,
    pub probe_result: Mutex<MediaProbe>,
    /// Pop-front script of transcode outcomes; empty = succeed.
    pub transcode_failures: Mutex<VecDeque<PluginError>>,
    pub transcodes: AtomicU64,
    pub unhealthy: AtomicBool,
}

impl Default for FakeEncoder {
    fn default() -> Self {
        Self {
            caps: EncoderCaps {
                video_codecs: vec!["h264".to_string(), "hevc".to_string()],
                audio_codecs: vec!["aac".to_string()],
                gpu_accelerated: false,
                gpu_type: None,
            },
            probe_result: Mutex::new(MediaProbe {
                duration_seconds: 120.0,
                width: 1920,
                height: 1080,
                bitrate: 6_000_000,
                format: "mp4".to_string(),
                streams: vec!["video".to_string(), "audio".to_string()],
                keyframes: (0..=12).map(|n| n as f64 * 10.0).collect(),
            }),
            transcode_failures: Mutex::new(VecDeque::new()),
            transcodes: AtomicU64::new(0),
            unhealthy: AtomicBool::new(false),
        }
    }
}

impl FakeEncoder {
    pub fn gpu(mut self, gpu_type: &str) -> Self {
        self.caps.gpu_accelerated = true;
        self.caps.gpu_type = Some(gpu_type.to_string());
        self
    }

    pub fn with_probe(self, probe: MediaProbe) -> Self {
        *self.probe_result.lock() = probe;
        self
    }
}

#[async_trait]
impl EncoderPlugin for FakeEncoder {
    async fn get_capabilities(&self) -> Result<EncoderCaps, PluginError> {
        Ok(self.caps.clone())
    }

    async fn probe(&self, _input_url: &str) -> Result<MediaProbe, PluginError> {
        Ok(self.probe_result.lock().clone())
    }

    async fn transcode(
        &self,
        spec: TaskSpec,
    ) -> Result<mpsc::Receiver<TaskProgress>, PluginError> {
        self.transcodes.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.transcode_failures.lock().pop_front() {
            return Err(err);
        }
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for percent in [25.0, 50.0, 75.0] {
                let _ = tx
                    .send(TaskProgress {
                        task_id: spec.task_id.clone(),
                        percent,
                        speed: 2.0,
                        fps: 60.0,
                        bitrate: 5_000_000,
                        current_time: spec.duration * percent / 100.0,
                        completed: false,
                    })
                    .await;
            }
            let _ = tx
                .send(TaskProgress {
                    task_id: spec.task_id.clone(),
                    percent: 100.0,
                    speed: 2.0,
                    fps: 60.0,
                    bitrate: 5_000_000,
                    current_time: spec.duration,
                    completed: true,
                })
                .await;
        });
        Ok(rx)
    }

    async fn ping(&self) -> Result<(), PluginError> {
        if self.unhealthy.load(Ordering::Relaxed) {
            Err(PluginError::Transport("unhealthy".into()))
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------

/// Live fake: in-memory ingest sessions and output targets.
#[derive(Default)]
pub struct FakeLive {
    pub sessions: Mutex<HashMap<String, FakeIngest>>,
    next: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct FakeIngest {
    pub config: IngestConfig,
    pub targets: Vec<String>,
    pub telemetry: IngestTelemetry,
}

impl FakeLive {
    pub fn set_telemetry(&self, session_id: &str, telemetry: IngestTelemetry) {
        if let Some(session) = self.sessions.lock().get_mut(session_id) {
            session.telemetry = telemetry;
        }
    }
}

#[async_trait]
impl LivePlugin for FakeLive {
    async fn start_ingest(&self, config: IngestConfig) -> Result<IngestSession, PluginError> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let id = format!("ingest-{n}");
        let session = IngestSession {
            id: id.clone(),
            ingest_url: format!("rtmp://ingest.local/live/{}", config.stream_key),
            playback_url: format!("https://play.local/{}.m3u8", config.stream_id),
        };
        self.sessions.lock().insert(
            id,
            FakeIngest { config, targets: Vec::new(), telemetry: IngestTelemetry::default() },
        );
        Ok(session)
    }

    async fn stop_ingest(&self, id: &str) -> Result<(), PluginError> {
        self.sessions.lock().remove(id);
        Ok(())
    }

    async fn get_telemetry(&self, id: &str) -> Result<IngestTelemetry, PluginError> {
        self.sessions
            .lock()
            .get(id)
            .map(|s| s.telemetry)
            .ok_or_else(|| PluginError::Remote {
                code: "LIVE-404".into(),
                message: format!("no session {id}"),
            })
    }

    async fn add_output_target(
        &self,
        session_id: &str,
        target_url: &str,
    ) -> Result<(), PluginError> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(session_id).ok_or_else(|| PluginError::Remote {
            code: "LIVE-404".into(),
            message: format!("no session {session_id}"),
        })?;
        if !session.targets.iter().any(|t| t == target_url) {
            session.targets.push(target_url.to_string());
        }
        Ok(())
    }

    async fn remove_output_target(
        &self,
        session_id: &str,
        target_url: &str,
    ) -> Result<(), PluginError> {
        if let Some(session) = self.sessions.lock().get_mut(session_id) {
            session.targets.retain(|t| t != target_url);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------

/// Publisher fake: scripted per-platform failure counts.
#[derive(Default)]
pub struct FakePublisher {
    /// platform → remaining failures before success.
    pub failures: Mutex<HashMap<String, u32>>,
    pub published: Mutex<Vec<PublishRequest>>,
    pub chat: Mutex<Vec<ChatMessage>>,
}

impl FakePublisher {
    pub fn failing(self, platform: &str, times: u32) -> Self {
        self.failures.lock().insert(platform.to_string(), times);
        self
    }
}

#[async_trait]
impl PublisherPlugin for FakePublisher {
    async fn publish(&self, request: PublishRequest) -> Result<PublishReceipt, PluginError> {
        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&request.platform) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(PluginError::Transport("upstream 503".into()));
                }
            }
        }
        let platform = request.platform.clone();
        self.published.lock().push(request);
        let n = self.published.lock().len();
        Ok(PublishReceipt {
            platform_id: format!("{platform}-{n}"),
            url: format!("https://{platform}.example/watch/{n}"),
        })
    }

    async fn retract(&self, platform_id: &str, _credentials_ref: &str) -> Result<(), PluginError> {
        self.published.lock().retain(|r| !platform_id.starts_with(r.platform.as_str()));
        Ok(())
    }

    async fn get_live_stream_endpoint(
        &self,
        _credentials_ref: &str,
    ) -> Result<LiveEndpoint, PluginError> {
        Ok(LiveEndpoint {
            rtmp_url: "rtmp://live.example/app".to_string(),
            stream_key: "remote-key".to_string(),
        })
    }

    async fn get_chat_messages(
        &self,
        _channel_id: &str,
        since_id: Option<&str>,
    ) -> Result<ChatPage, PluginError> {
        let chat = self.chat.lock();
        let start = since_id
            .and_then(|id| chat.iter().position(|m| m.id == id).map(|p| p + 1))
            .unwrap_or(0);
        let messages: Vec<ChatMessage> = chat[start.min(chat.len())..].to_vec();
        let next_since_id = messages.last().map(|m| m.id.clone());
        Ok(ChatPage { messages, next_since_id })
    }

    async fn send_chat_message(&self, _channel_id: &str, message: &str) -> Result<(), PluginError> {
        let mut chat = self.chat.lock();
        let id = format!("m{}", chat.len() + 1);
        chat.push(ChatMessage {
            id,
            author: "kernel".to_string(),
            text: message.to_string(),
            at_ms: 0,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------

/// Convenience bundle registering one fake of each type with a host.
pub fn full_mesh() -> Vec<(PluginManifest, PluginApi)> {
    vec![
        (
            manifest("fake-auth", PluginType::Auth, CapabilitySet {
                auth_schemes: vec!["bearer".to_string()],
                ..CapabilitySet::default()
            }),
            PluginApi::Auth(Arc::new(FakeAuth::default().with_user("user-1", "user").with_user("admin-1", "admin"))),
        ),
        (
            manifest("fake-fs", PluginType::Storage, CapabilitySet {
                url_schemes: vec!["fs".to_string(), "file".to_string(), "http".to_string(), "https".to_string()],
                ..CapabilitySet::default()
            }),
            PluginApi::Storage(Arc::new(FakeStorage::default())),
        ),
        (
            manifest("fake-enc", PluginType::Encoder, CapabilitySet {
                video_codecs: vec!["h264".to_string(), "hevc".to_string()],
                audio_codecs: vec!["aac".to_string()],
                ..CapabilitySet::default()
            }),
            PluginApi::Encoder(Arc::new(FakeEncoder::default())),
        ),
        (
            manifest("fake-live", PluginType::Live, CapabilitySet {
                ingest_protocols: vec!["rtmp".to_string()],
                ..CapabilitySet::default()
            }),
            PluginApi::Live(Arc::new(FakeLive::default())),
        ),
        (
            manifest("fake-pub", PluginType::Publisher, CapabilitySet {
                platforms: vec!["twitch".to_string(), "kick".to_string()],
                ..CapabilitySet::default()
            }),
            PluginApi::Publisher(Arc::new(FakePublisher::default())),
        ),
    ]
}
