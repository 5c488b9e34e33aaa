// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL RPC over a plugin's stdio.
//!
//! Wire format, one JSON object per line:
//!
//! - handshake (plugin → kernel, first line):
//!   `{"cookie":"…","protocol_version":1,"plugin_id":"…"}`
//! - request (kernel → plugin): `{"id":N,"method":"…","params":{…}}`
//! - unary response: `{"id":N,"result":{…}}` or
//!   `{"id":N,"error":{"code":"…","message":"…"}}`
//! - stream frame: `{"id":N,"frame":{…}}`, terminated by a `result` line.
//!
//! Stream frames go into a bounded channel with drop-on-overflow: the
//! reader task never blocks on a slow consumer, except the terminal
//! frame, which is always delivered.

use crate::contracts::PluginError;
use crate::health::ErrorWindow;
use crate::process::ProcessPipes;
use cf_core::{Clock, PROTOCOL_VERSION};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Environment variable carrying the shared magic cookie.
pub const MAGIC_COOKIE_ENV: &str = "CASTFORGE_PLUGIN_COOKIE";

/// Handshake must complete within the discovery budget.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default unary call budget (discovery RPCs).
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Stream frame buffer; overflow drops interior frames.
const STREAM_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("connection closed")]
    Closed,
}

#[derive(Deserialize)]
struct Handshake {
    cookie: String,
    protocol_version: u32,
    plugin_id: String,
}

#[derive(Deserialize)]
struct Incoming {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteError>,
    #[serde(default)]
    frame: Option<Value>,
}

#[derive(Deserialize)]
struct RemoteError {
    code: String,
    message: String,
}

enum PendingCall {
    Unary(oneshot::Sender<Result<Value, PluginError>>),
    Stream(mpsc::Sender<Value>),
}

/// Client half of one plugin's RPC channel. Cheap to clone; all clones
/// share the pending-call table and the outbound writer.
#[derive(Clone)]
pub struct RpcClient {
    plugin_id: String,
    next_id: Arc<AtomicU64>,
    pending: Arc<Mutex<HashMap<u64, PendingCall>>>,
    writer_tx: mpsc::UnboundedSender<String>,
    /// Cleared when the reader sees EOF; new calls fail fast instead of
    /// waiting out their timeout.
    alive: Arc<AtomicBool>,
    /// Call outcomes feed the host's health classification.
    pub window: Arc<ErrorWindow>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("plugin_id", &self.plugin_id)
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Perform the handshake and start the reader/writer tasks.
    ///
    /// The plugin's first stdout line must echo the magic cookie and a
    /// matching protocol version; anything else leaves it Disabled.
    pub async fn connect(
        expected_plugin_id: &str,
        pipes: ProcessPipes,
        cookie: &str,
        window: Arc<ErrorWindow>,
    ) -> Result<Self, RpcError> {
        let mut reader = BufReader::new(pipes.stdout);
        let mut line = String::new();

        let read = tokio::time::timeout(HANDSHAKE_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| RpcError::Handshake("timed out".to_string()))??;
        if read == 0 {
            return Err(RpcError::Handshake("plugin closed stdout".to_string()));
        }

        let handshake: Handshake = serde_json::from_str(line.trim())
            .map_err(|e| RpcError::Handshake(format!("bad handshake line: {e}")))?;
        if handshake.cookie != cookie {
            return Err(RpcError::Handshake("magic cookie mismatch".to_string()));
        }
        if handshake.protocol_version != PROTOCOL_VERSION {
            return Err(RpcError::Handshake(format!(
                "protocol {} != kernel {}",
                handshake.protocol_version, PROTOCOL_VERSION
            )));
        }
        if handshake.plugin_id != expected_plugin_id {
            return Err(RpcError::Handshake(format!(
                "plugin identifies as {:?}, expected {:?}",
                handshake.plugin_id, expected_plugin_id
            )));
        }

        let pending: Arc<Mutex<HashMap<u64, PendingCall>>> = Arc::new(Mutex::new(HashMap::new()));
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();

        // Writer task: owns stdin
        let mut stdin = pipes.stdin;
        let writer_plugin = expected_plugin_id.to_string();
        tokio::spawn(async move {
            while let Some(line) = writer_rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    warn!(plugin = %writer_plugin, "plugin stdin closed");
                    break;
                }
            }
        });

        // Reader task: dispatches responses and frames
        let alive = Arc::new(AtomicBool::new(true));
        let reader_pending = Arc::clone(&pending);
        let reader_alive = Arc::clone(&alive);
        let reader_plugin = expected_plugin_id.to_string();
        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => dispatch_line(&reader_pending, &reader_plugin, &line),
                    Ok(None) | Err(_) => break,
                }
            }
            // Process gone: refuse new calls first, then fail every
            // pending one (covers calls racing the EOF).
            reader_alive.store(false, Ordering::Release);
            let mut map = reader_pending.lock();
            for (_, call) in map.drain() {
                match call {
                    PendingCall::Unary(tx) => {
                        let _ = tx.send(Err(PluginError::Crashed));
                    }
                    PendingCall::Stream(_) => {}
                }
            }
            debug!(plugin = %reader_plugin, "rpc reader stopped");
        });

        Ok(Self {
            plugin_id: expected_plugin_id.to_string(),
            next_id: Arc::new(AtomicU64::new(1)),
            pending,
            writer_tx,
            alive,
            window,
        })
    }

    /// Unary call with the default timeout.
    pub async fn call(
        &self,
        clock: &impl Clock,
        method: &str,
        params: Value,
    ) -> Result<Value, PluginError> {
        self.call_with_timeout(clock, method, params, CALL_TIMEOUT).await
    }

    /// Unary call with an explicit budget (health probes use 5 s).
    pub async fn call_with_timeout(
        &self,
        clock: &impl Clock,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, PluginError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, PendingCall::Unary(tx));
        self.send(id, method, params)?;

        // The reader clears `alive` before draining, so either it sees
        // this entry or this check sees the EOF.
        if !self.alive.load(Ordering::Acquire) && self.pending.lock().remove(&id).is_some() {
            self.window.record(clock.epoch_ms(), false);
            return Err(PluginError::Crashed);
        }

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PluginError::Crashed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(PluginError::Timeout(timeout))
            }
        };
        self.window.record(clock.epoch_ms(), outcome.is_ok());
        outcome
    }

    /// Streaming call: frames arrive on the returned channel until the
    /// terminal `result` line closes it. Interior frames may be dropped
    /// under backpressure; the channel closing is the terminal signal.
    pub fn call_streaming(
        &self,
        clock: &impl Clock,
        method: &str,
        params: Value,
    ) -> Result<mpsc::Receiver<Value>, PluginError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        self.pending.lock().insert(id, PendingCall::Stream(tx));
        self.send(id, method, params)?;
        self.window.record(clock.epoch_ms(), true);
        Ok(rx)
    }

    fn send(&self, id: u64, method: &str, params: Value) -> Result<(), PluginError> {
        let line = format!(
            "{}\n",
            serde_json::json!({ "id": id, "method": method, "params": params })
        );
        self.writer_tx
            .send(line)
            .map_err(|_| PluginError::Transport(format!("{} writer gone", self.plugin_id)))
    }
}

fn dispatch_line(
    pending: &Mutex<HashMap<u64, PendingCall>>,
    plugin_id: &str,
    line: &str,
) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    let incoming: Incoming = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            warn!(plugin = %plugin_id, error = %e, "unparseable rpc line");
            return;
        }
    };

    let mut map = pending.lock();
    if let Some(frame) = incoming.frame {
        if let Some(PendingCall::Stream(tx)) = map.get(&incoming.id) {
            // Drop-on-overflow: progress is a hint, not an invariant
            let _ = tx.try_send(frame);
        }
        return;
    }

    match map.remove(&incoming.id) {
        Some(PendingCall::Unary(tx)) => {
            let outcome = match (incoming.result, incoming.error) {
                (_, Some(e)) => Err(PluginError::Remote { code: e.code, message: e.message }),
                (Some(v), None) => Ok(v),
                (None, None) => Ok(Value::Null),
            };
            let _ = tx.send(outcome);
        }
        Some(PendingCall::Stream(tx)) => {
            // Terminal frame must arrive even under backpressure: block
            // the reader briefly rather than lose completion.
            if let Some(v) = incoming.result {
                let tx2 = tx.clone();
                tokio::spawn(async move {
                    let _ = tx2.send(v).await;
                });
            }
            // Dropping `tx` closes the stream once the terminal send lands
        }
        None => {
            warn!(plugin = %plugin_id, id = incoming.id, "response for unknown call");
        }
    }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
