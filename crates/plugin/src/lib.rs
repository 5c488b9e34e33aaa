// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cf-plugin: the plugin federation host.
//!
//! Plugins are capability providers the kernel addresses over per-process
//! RPC. The host owns discovery, the handshake, configuration binding,
//! the health loop, shadow upgrades, and routing. It never knows what a
//! plugin does, only what it claims to do.

pub mod contracts;
pub mod health;
pub mod host;
pub mod manifest;
pub mod process;
pub mod remote;
pub mod rpc;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use contracts::{
    AuthPlugin, AuthzDecision, BrowseEntry, ChatMessage, ChatPage, EncoderCaps, EncoderPlugin,
    IngestConfig, IngestSession, IngestTelemetry, LiveEndpoint, LivePlugin, MediaProbe,
    ObjectList, ObjectMeta, PluginApi, PluginError, ProbeStream, PublishReceipt, PublishRequest,
    PublisherPlugin, SignedUrl, StorageCaps, StoragePlugin, TaskProgress, TaskSpec, TokenIdentity,
    UploadReceipt, UserPage, UserRecord,
};
pub use health::ErrorWindow;
pub use host::{HostError, Launcher, PluginHost, RouteError};
pub use manifest::{check_protocol, discover_manifests, load_manifest, DiscoveredPlugin, ManifestError};
pub use process::{PluginProcess, ProcessError, ProcessPipes};
pub use remote::wrap_client;
pub use rpc::{RpcClient, RpcError, MAGIC_COOKIE_ENV};
