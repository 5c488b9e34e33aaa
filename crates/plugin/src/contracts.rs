// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The five capability contracts.
//!
//! Each contract is an async trait with a closed operation set; the host
//! registry stores them as tagged [`PluginApi`] variants. Streaming
//! operations hand back bounded channels; for progress the producer
//! never blocks and may drop updates, but the terminal event is always
//! delivered.

use async_trait::async_trait;
use cf_core::EncodeProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure surface shared by every contract operation.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    #[error("plugin transport error: {0}")]
    Transport(String),
    /// Process died; the pending call fails retryable.
    #[error("plugin crashed")]
    Crashed,
    #[error("plugin call timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// Error returned by the plugin itself.
    #[error("plugin error {code}: {message}")]
    Remote { code: String, message: String },
    #[error("handshake rejected: {0}")]
    Handshake(String),
}

impl PluginError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            PluginError::Transport(_) | PluginError::Crashed | PluginError::Timeout(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Auth

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenIdentity {
    pub valid: bool,
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthzDecision {
    pub allowed: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPage {
    pub users: Vec<UserRecord>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

#[async_trait]
pub trait AuthPlugin: Send + Sync {
    async fn validate_token(&self, raw: &str, scheme: &str) -> Result<TokenIdentity, PluginError>;

    /// Pure over (role-set, action, resource-type); the optional resource
    /// id only narrows ownership checks.
    async fn authorize(
        &self,
        user_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> Result<AuthzDecision, PluginError>;

    async fn get_user(&self, id: &str) -> Result<UserRecord, PluginError>;

    async fn list_users(
        &self,
        page: u32,
        page_size: u32,
        role_filter: Option<&str>,
    ) -> Result<UserPage, PluginError>;

    async fn refresh_token(&self, refresh: &str) -> Result<TokenIdentity, PluginError>;

    async fn logout(&self, user_id: &str, all_sessions: bool) -> Result<(), PluginError>;

    /// Liveness probe used by the host's health loop.
    async fn ping(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn AuthPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn AuthPlugin")
    }
}

// ---------------------------------------------------------------------------
// Storage

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub url: String,
    pub size: u64,
    pub etag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedUrl {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectList {
    pub objects: Vec<ObjectEntry>,
    #[serde(default)]
    pub common_prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageCaps {
    pub schemes: Vec<String>,
    #[serde(default)]
    pub supports_signed_urls: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub is_media: bool,
}

/// Download handle: metadata first, then the byte stream.
pub struct ProbeStream {
    pub meta: ObjectMeta,
    pub chunks: mpsc::Receiver<Vec<u8>>,
}

#[async_trait]
pub trait StoragePlugin: Send + Sync {
    /// Upload protocol: the metadata message opens the stream, chunks
    /// follow, channel close finalizes.
    async fn upload(
        &self,
        meta: ObjectMeta,
        data: mpsc::Receiver<Vec<u8>>,
    ) -> Result<UploadReceipt, PluginError>;

    async fn download(&self, bucket: &str, path: &str) -> Result<ProbeStream, PluginError>;

    async fn delete(&self, bucket: &str, path: &str) -> Result<(), PluginError>;

    async fn get_url(&self, bucket: &str, key: &str) -> Result<String, PluginError>;

    async fn get_upload_url(
        &self,
        bucket: &str,
        key: &str,
        expiry_secs: u64,
        content_type: Option<&str>,
        method: &str,
    ) -> Result<SignedUrl, PluginError>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        max_keys: u32,
        continuation: Option<&str>,
    ) -> Result<ObjectList, PluginError>;

    async fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMeta, PluginError>;

    async fn get_capabilities(&self) -> Result<StorageCaps, PluginError>;

    async fn browse_roots(&self) -> Result<Vec<BrowseEntry>, PluginError>;

    async fn browse(
        &self,
        path: &str,
        show_hidden: bool,
        media_only: bool,
        search_query: Option<&str>,
    ) -> Result<Vec<BrowseEntry>, PluginError>;

    async fn ping(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn StoragePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn StoragePlugin")
    }
}

// ---------------------------------------------------------------------------
// Encoder

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderCaps {
    pub video_codecs: Vec<String>,
    pub audio_codecs: Vec<String>,
    #[serde(default)]
    pub gpu_accelerated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<String>,
}

/// Probe result for a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
    pub format: String,
    #[serde(default)]
    pub streams: Vec<String>,
    /// Offsets (seconds) of independent decode points, ascending.
    #[serde(default)]
    pub keyframes: Vec<f64>,
}

/// One segment encode order handed to a worker / the encoder plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub input_url: String,
    pub output_url: String,
    pub profile: EncodeProfile,
    pub start_time: f64,
    pub duration: f64,
    /// Concat-demuxer stitch runs pass the list content instead of a
    /// time window; codec contract is `copy` for both streams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concat_list: Option<String>,
}

/// Streaming progress frame; `completed` marks the terminal frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: String,
    /// 0..=100, monotone non-decreasing per task.
    pub percent: f64,
    /// Realtime multiplier (1.0 = realtime).
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub fps: f64,
    /// Bits per second.
    #[serde(default)]
    pub bitrate: u64,
    /// Source-relative position in seconds.
    #[serde(default)]
    pub current_time: f64,
    #[serde(default)]
    pub completed: bool,
}

#[async_trait]
pub trait EncoderPlugin: Send + Sync {
    async fn get_capabilities(&self) -> Result<EncoderCaps, PluginError>;

    async fn probe(&self, input_url: &str) -> Result<MediaProbe, PluginError>;

    /// Transcode is unbounded; the kernel requires a progress keepalive
    /// every 30 s or it treats the task as stuck and retries.
    async fn transcode(
        &self,
        spec: TaskSpec,
    ) -> Result<mpsc::Receiver<TaskProgress>, PluginError>;

    async fn ping(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn EncoderPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn EncoderPlugin")
    }
}

// ---------------------------------------------------------------------------
// Live

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    pub stream_id: String,
    /// `rtmp`, `srt`, or `webrtc`.
    pub protocol: String,
    pub stream_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSession {
    pub id: String,
    pub ingest_url: String,
    pub playback_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct IngestTelemetry {
    pub is_live: bool,
    pub bitrate: u64,
    pub fps: f64,
    pub viewers: u64,
}

#[async_trait]
pub trait LivePlugin: Send + Sync {
    async fn start_ingest(&self, config: IngestConfig) -> Result<IngestSession, PluginError>;

    async fn stop_ingest(&self, id: &str) -> Result<(), PluginError>;

    async fn get_telemetry(&self, id: &str) -> Result<IngestTelemetry, PluginError>;

    async fn add_output_target(&self, session_id: &str, target_url: &str)
        -> Result<(), PluginError>;

    async fn remove_output_target(
        &self,
        session_id: &str,
        target_url: &str,
    ) -> Result<(), PluginError>;

    async fn ping(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn LivePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn LivePlugin")
    }
}

// ---------------------------------------------------------------------------
// Publisher

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub platform: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub privacy: String,
    pub artifact_url: String,
    /// Opaque reference; the plugin resolves the actual credential.
    pub credentials_ref: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub platform_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEndpoint {
    pub rtmp_url: String,
    pub stream_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub author: String,
    pub text: String,
    pub at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPage {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_since_id: Option<String>,
}

#[async_trait]
pub trait PublisherPlugin: Send + Sync {
    async fn publish(&self, request: PublishRequest) -> Result<PublishReceipt, PluginError>;

    async fn retract(&self, platform_id: &str, credentials_ref: &str) -> Result<(), PluginError>;

    async fn get_live_stream_endpoint(
        &self,
        credentials_ref: &str,
    ) -> Result<LiveEndpoint, PluginError>;

    async fn get_chat_messages(
        &self,
        channel_id: &str,
        since_id: Option<&str>,
    ) -> Result<ChatPage, PluginError>;

    async fn send_chat_message(&self, channel_id: &str, message: &str) -> Result<(), PluginError>;

    async fn ping(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn PublisherPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn PublisherPlugin")
    }
}

// ---------------------------------------------------------------------------

/// Tagged handle to a registered plugin instance.
#[derive(Clone)]
pub enum PluginApi {
    Auth(Arc<dyn AuthPlugin>),
    Storage(Arc<dyn StoragePlugin>),
    Encoder(Arc<dyn EncoderPlugin>),
    Live(Arc<dyn LivePlugin>),
    Publisher(Arc<dyn PublisherPlugin>),
}

impl PluginApi {
    pub fn plugin_type(&self) -> cf_core::PluginType {
        match self {
            PluginApi::Auth(_) => cf_core::PluginType::Auth,
            PluginApi::Storage(_) => cf_core::PluginType::Storage,
            PluginApi::Encoder(_) => cf_core::PluginType::Encoder,
            PluginApi::Live(_) => cf_core::PluginType::Live,
            PluginApi::Publisher(_) => cf_core::PluginType::Publisher,
        }
    }

    /// Liveness probe dispatched to the concrete contract.
    pub async fn ping(&self) -> Result<(), PluginError> {
        match self {
            PluginApi::Auth(p) => p.ping().await,
            PluginApi::Storage(p) => p.ping().await,
            PluginApi::Encoder(p) => p.ping().await,
            PluginApi::Live(p) => p.ping().await,
            PluginApi::Publisher(p) => p.ping().await,
        }
    }
}

impl std::fmt::Debug for PluginApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PluginApi::{}", self.plugin_type())
    }
}
