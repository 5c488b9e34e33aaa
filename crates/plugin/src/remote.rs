// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC-backed contract implementations.
//!
//! Each `Remote*` wraps one plugin's [`RpcClient`] and translates the
//! typed contract into JSONL methods. Byte streams cross the boundary
//! base64-framed (`upload_begin`/`upload_chunk`/`upload_end` for
//! uploads, metadata-first frames for downloads).

use crate::contracts::*;
use crate::rpc::RpcClient;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use cf_core::SystemClock;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

/// Health probes run on a tighter budget than discovery calls.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, PluginError> {
    serde_json::from_value(value)
        .map_err(|e| PluginError::Transport(format!("malformed response: {e}")))
}

macro_rules! remote_plugin {
    ($name:ident) => {
        pub struct $name {
            client: RpcClient,
            clock: SystemClock,
        }

        impl $name {
            pub fn new(client: RpcClient) -> Self {
                Self { client, clock: SystemClock }
            }

            async fn call<T: DeserializeOwned>(
                &self,
                method: &str,
                params: Value,
            ) -> Result<T, PluginError> {
                decode(self.client.call(&self.clock, method, params).await?)
            }
        }
    };
}

// ---------------------------------------------------------------------------

remote_plugin!(RemoteAuth);

#[async_trait]
impl AuthPlugin for RemoteAuth {
    async fn validate_token(&self, raw: &str, scheme: &str) -> Result<TokenIdentity, PluginError> {
        self.call("validate_token", json!({ "raw": raw, "scheme": scheme })).await
    }

    async fn authorize(
        &self,
        user_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> Result<AuthzDecision, PluginError> {
        self.call(
            "authorize",
            json!({
                "user_id": user_id,
                "action": action,
                "resource_type": resource_type,
                "resource_id": resource_id,
            }),
        )
        .await
    }

    async fn get_user(&self, id: &str) -> Result<UserRecord, PluginError> {
        self.call("get_user", json!({ "id": id })).await
    }

    async fn list_users(
        &self,
        page: u32,
        page_size: u32,
        role_filter: Option<&str>,
    ) -> Result<UserPage, PluginError> {
        self.call(
            "list_users",
            json!({ "page": page, "page_size": page_size, "role_filter": role_filter }),
        )
        .await
    }

    async fn refresh_token(&self, refresh: &str) -> Result<TokenIdentity, PluginError> {
        self.call("refresh_token", json!({ "refresh": refresh })).await
    }

    async fn logout(&self, user_id: &str, all_sessions: bool) -> Result<(), PluginError> {
        let _: Value = self
            .call("logout", json!({ "user_id": user_id, "all_sessions": all_sessions }))
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), PluginError> {
        let _ = self
            .client
            .call_with_timeout(&self.clock, "ping", json!({}), PROBE_TIMEOUT)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------

remote_plugin!(RemoteStorage);

#[async_trait]
impl StoragePlugin for RemoteStorage {
    async fn upload(
        &self,
        meta: ObjectMeta,
        mut data: mpsc::Receiver<Vec<u8>>,
    ) -> Result<UploadReceipt, PluginError> {
        // Metadata opens the stream, chunks follow, end finalizes
        let begin: Value = self
            .call("upload_begin", serde_json::to_value(&meta).unwrap_or_default())
            .await?;
        let upload_id = begin
            .get("upload_id")
            .and_then(Value::as_str)
            .ok_or_else(|| PluginError::Transport("upload_begin returned no id".into()))?
            .to_string();

        while let Some(chunk) = data.recv().await {
            let _: Value = self
                .call(
                    "upload_chunk",
                    json!({ "upload_id": upload_id, "data": B64.encode(&chunk) }),
                )
                .await?;
        }
        self.call("upload_end", json!({ "upload_id": upload_id })).await
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<ProbeStream, PluginError> {
        let mut frames = self.client.call_streaming(
            &self.clock,
            "download",
            json!({ "bucket": bucket, "path": path }),
        )?;

        // First frame carries metadata, the rest carry base64 bytes
        let meta_frame = frames
            .recv()
            .await
            .ok_or_else(|| PluginError::Transport("download stream closed early".into()))?;
        let meta: ObjectMeta = decode(meta_frame)?;

        let (tx, chunks) = mpsc::channel(8);
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let Some(data) = frame.get("data").and_then(Value::as_str) else {
                    continue;
                };
                match B64.decode(data) {
                    Ok(bytes) => {
                        if tx.send(bytes).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
        Ok(ProbeStream { meta, chunks })
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<(), PluginError> {
        let _: Value = self.call("delete", json!({ "bucket": bucket, "path": path })).await?;
        Ok(())
    }

    async fn get_url(&self, bucket: &str, key: &str) -> Result<String, PluginError> {
        let value: Value = self.call("get_url", json!({ "bucket": bucket, "key": key })).await?;
        value
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PluginError::Transport("get_url returned no url".into()))
    }

    async fn get_upload_url(
        &self,
        bucket: &str,
        key: &str,
        expiry_secs: u64,
        content_type: Option<&str>,
        method: &str,
    ) -> Result<SignedUrl, PluginError> {
        self.call(
            "get_upload_url",
            json!({
                "bucket": bucket,
                "key": key,
                "expiry_secs": expiry_secs,
                "content_type": content_type,
                "method": method,
            }),
        )
        .await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        max_keys: u32,
        continuation: Option<&str>,
    ) -> Result<ObjectList, PluginError> {
        self.call(
            "list_objects",
            json!({
                "bucket": bucket,
                "prefix": prefix,
                "delimiter": delimiter,
                "max_keys": max_keys,
                "continuation": continuation,
            }),
        )
        .await
    }

    async fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMeta, PluginError> {
        self.call("get_object_metadata", json!({ "bucket": bucket, "key": key })).await
    }

    async fn get_capabilities(&self) -> Result<StorageCaps, PluginError> {
        self.call("get_capabilities", json!({})).await
    }

    async fn browse_roots(&self) -> Result<Vec<BrowseEntry>, PluginError> {
        self.call("browse_roots", json!({})).await
    }

    async fn browse(
        &self,
        path: &str,
        show_hidden: bool,
        media_only: bool,
        search_query: Option<&str>,
    ) -> Result<Vec<BrowseEntry>, PluginError> {
        self.call(
            "browse",
            json!({
                "path": path,
                "show_hidden": show_hidden,
                "media_only": media_only,
                "search_query": search_query,
            }),
        )
        .await
    }

    async fn ping(&self) -> Result<(), PluginError> {
        let _ = self
            .client
            .call_with_timeout(&self.clock, "ping", json!({}), PROBE_TIMEOUT)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------

remote_plugin!(RemoteEncoder);

#[async_trait]
impl EncoderPlugin for RemoteEncoder {
    async fn get_capabilities(&self) -> Result<EncoderCaps, PluginError> {
        self.call("get_capabilities", json!({})).await
    }

    async fn probe(&self, input_url: &str) -> Result<MediaProbe, PluginError> {
        self.call("probe", json!({ "input_url": input_url })).await
    }

    async fn transcode(
        &self,
        spec: TaskSpec,
    ) -> Result<mpsc::Receiver<TaskProgress>, PluginError> {
        let mut frames = self.client.call_streaming(
            &self.clock,
            "transcode",
            serde_json::to_value(&spec).unwrap_or_default(),
        )?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                if let Ok(progress) = serde_json::from_value::<TaskProgress>(frame) {
                    let terminal = progress.completed;
                    if terminal {
                        // Completion may not be lost
                        let _ = tx.send(progress).await;
                        break;
                    }
                    let _ = tx.try_send(progress);
                }
            }
        });
        Ok(rx)
    }

    async fn ping(&self) -> Result<(), PluginError> {
        let _ = self
            .client
            .call_with_timeout(&self.clock, "ping", json!({}), PROBE_TIMEOUT)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------

remote_plugin!(RemoteLive);

#[async_trait]
impl LivePlugin for RemoteLive {
    async fn start_ingest(&self, config: IngestConfig) -> Result<IngestSession, PluginError> {
        self.call("start_ingest", serde_json::to_value(&config).unwrap_or_default()).await
    }

    async fn stop_ingest(&self, id: &str) -> Result<(), PluginError> {
        let _: Value = self.call("stop_ingest", json!({ "id": id })).await?;
        Ok(())
    }

    async fn get_telemetry(&self, id: &str) -> Result<IngestTelemetry, PluginError> {
        self.call("get_telemetry", json!({ "id": id })).await
    }

    async fn add_output_target(
        &self,
        session_id: &str,
        target_url: &str,
    ) -> Result<(), PluginError> {
        let _: Value = self
            .call(
                "add_output_target",
                json!({ "session_id": session_id, "target_url": target_url }),
            )
            .await?;
        Ok(())
    }

    async fn remove_output_target(
        &self,
        session_id: &str,
        target_url: &str,
    ) -> Result<(), PluginError> {
        let _: Value = self
            .call(
                "remove_output_target",
                json!({ "session_id": session_id, "target_url": target_url }),
            )
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), PluginError> {
        let _ = self
            .client
            .call_with_timeout(&self.clock, "ping", json!({}), PROBE_TIMEOUT)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------

remote_plugin!(RemotePublisher);

#[async_trait]
impl PublisherPlugin for RemotePublisher {
    async fn publish(&self, request: PublishRequest) -> Result<PublishReceipt, PluginError> {
        self.call("publish", serde_json::to_value(&request).unwrap_or_default()).await
    }

    async fn retract(&self, platform_id: &str, credentials_ref: &str) -> Result<(), PluginError> {
        let _: Value = self
            .call(
                "retract",
                json!({ "platform_id": platform_id, "credentials_ref": credentials_ref }),
            )
            .await?;
        Ok(())
    }

    async fn get_live_stream_endpoint(
        &self,
        credentials_ref: &str,
    ) -> Result<LiveEndpoint, PluginError> {
        self.call("get_live_stream_endpoint", json!({ "credentials_ref": credentials_ref })).await
    }

    async fn get_chat_messages(
        &self,
        channel_id: &str,
        since_id: Option<&str>,
    ) -> Result<ChatPage, PluginError> {
        self.call("get_chat_messages", json!({ "channel_id": channel_id, "since_id": since_id }))
            .await
    }

    async fn send_chat_message(&self, channel_id: &str, message: &str) -> Result<(), PluginError> {
        let _: Value = self
            .call("send_chat_message", json!({ "channel_id": channel_id, "message": message }))
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), PluginError> {
        let _ = self
            .client
            .call_with_timeout(&self.clock, "ping", json!({}), PROBE_TIMEOUT)
            .await?;
        Ok(())
    }
}

/// Wrap a connected client in the contract its manifest declares.
pub fn wrap_client(plugin_type: cf_core::PluginType, client: RpcClient) -> PluginApi {
    use std::sync::Arc;
    match plugin_type {
        cf_core::PluginType::Auth => PluginApi::Auth(Arc::new(RemoteAuth::new(client))),
        cf_core::PluginType::Storage => PluginApi::Storage(Arc::new(RemoteStorage::new(client))),
        cf_core::PluginType::Encoder => PluginApi::Encoder(Arc::new(RemoteEncoder::new(client))),
        cf_core::PluginType::Live => PluginApi::Live(Arc::new(RemoteLive::new(client))),
        cf_core::PluginType::Publisher => {
            PluginApi::Publisher(Arc::new(RemotePublisher::new(client)))
        }
    }
}
