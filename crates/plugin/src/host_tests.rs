// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::{self, FakeEncoder};
use cf_core::{CapabilitySet, FakeClock};
use std::collections::HashMap;

fn host() -> PluginHost<FakeClock> {
    PluginHost::new(FakeClock::new())
}

fn host_with_mesh() -> PluginHost<FakeClock> {
    let host = host();
    for (manifest, api) in fake::full_mesh() {
        host.register(manifest, HashMap::new(), api, None).unwrap();
    }
    host
}

#[test]
fn register_emits_install_config_health() {
    let host = host();
    let (manifest, api) = fake::full_mesh().remove(0);
    let events = host.register(manifest, HashMap::new(), api, None).unwrap();

    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["plugin:installed", "plugin:configured", "plugin:health"]);
    assert_eq!(host.health_of("fake-auth"), Some(PluginHealth::Healthy));
}

#[test]
fn register_rejects_protocol_mismatch() {
    let host = host();
    let (mut manifest, api) = fake::full_mesh().remove(0);
    manifest.protocol_version = 99;
    let err = host.register(manifest, HashMap::new(), api, None).unwrap_err();
    assert!(matches!(err, HostError::Manifest(_)));
}

#[test]
fn register_validates_config_schema() {
    let host = host();
    let (mut manifest, api) = fake::full_mesh().remove(1);
    manifest.config_schema = vec![cf_core::ConfigField {
        name: "bucket".into(),
        kind: "string".into(),
        required: true,
        description: None,
    }];
    let err = host.register(manifest, HashMap::new(), api, None).unwrap_err();
    assert!(matches!(err, HostError::Config(_)));
}

#[test]
fn storage_routes_by_scheme() {
    let host = host_with_mesh();
    assert!(host.storage_for_url("fs://media/in.mp4").is_ok());
    assert!(host.storage_for_url("https://cdn.example/in.mp4").is_ok());

    let err = host.storage_for_url("s3://bucket/key").unwrap_err();
    assert!(matches!(err, RouteError::NoStorageForScheme(s) if s == "s3"));
}

#[test]
fn encoder_routes_by_codec() {
    let host = host_with_mesh();
    assert!(host.encoder_for("h264", false).is_ok());
    let err = host.encoder_for("av1", false).unwrap_err();
    assert!(matches!(err, RouteError::NoEncoderForCodec(_)));
}

#[test]
fn encoder_prefers_gpu_when_asked() {
    let host = host();
    let cpu = fake::manifest("enc-cpu", cf_core::PluginType::Encoder, CapabilitySet {
        video_codecs: vec!["h264".into()],
        ..CapabilitySet::default()
    });
    let mut gpu_caps = CapabilitySet {
        video_codecs: vec!["h264".into()],
        ..CapabilitySet::default()
    };
    gpu_caps.gpu_accelerated = true;
    let gpu = fake::manifest("enc-gpu", cf_core::PluginType::Encoder, gpu_caps);

    host.register(cpu, HashMap::new(), PluginApi::Encoder(Arc::new(FakeEncoder::default())), None)
        .unwrap();
    host.register(
        gpu,
        HashMap::new(),
        PluginApi::Encoder(Arc::new(FakeEncoder::default().gpu("nvenc"))),
        None,
    )
    .unwrap();

    // With prefer_gpu the GPU instance always wins, regardless of rotation
    for _ in 0..4 {
        let picked = host.encoder_for("h264", true).unwrap();
        let caps = futures_block(picked.get_capabilities()).unwrap();
        assert!(caps.gpu_accelerated);
    }
}

#[test]
fn encoder_round_robins_ties() {
    let host = host();
    for id in ["enc-a", "enc-b"] {
        let manifest = fake::manifest(id, cf_core::PluginType::Encoder, CapabilitySet {
            video_codecs: vec!["h264".into()],
            ..CapabilitySet::default()
        });
        host.register(
            manifest,
            HashMap::new(),
            PluginApi::Encoder(Arc::new(FakeEncoder::default())),
            None,
        )
        .unwrap();
    }

    // Two consecutive picks alternate instances (observable via ptr identity)
    let a = host.encoder_for("h264", false).unwrap();
    let b = host.encoder_for("h264", false).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    let c = host.encoder_for("h264", false).unwrap();
    assert!(Arc::ptr_eq(&a, &c));
}

#[test]
fn publisher_routes_by_platform() {
    let host = host_with_mesh();
    assert!(host.publisher_for("twitch").is_ok());
    assert!(matches!(
        host.publisher_for("rumble").unwrap_err(),
        RouteError::NoPublisherForPlatform(_)
    ));
}

#[test]
fn live_routes_by_protocol() {
    let host = host_with_mesh();
    assert!(host.live_for("rtmp").is_ok());
    assert!(matches!(host.live_for("srt").unwrap_err(), RouteError::NoLiveForProtocol(_)));
}

#[test]
fn auth_fails_closed_when_unhealthy() {
    let host = host_with_mesh();
    assert!(host.auth().is_ok());

    host.disable("fake-auth").unwrap();
    assert!(matches!(host.auth().unwrap_err(), RouteError::AuthUnavailable));
}

#[test]
fn unhealthy_instances_are_not_routed() {
    let host = host_with_mesh();
    host.disable("fake-fs").unwrap();
    assert!(host.storage_for_url("fs://media/x").is_err());
}

#[tokio::test]
async fn failed_window_schedules_restart_then_recovers() {
    let host = host_with_mesh();
    // Seed the window with a sustained 50% error rate (host FakeClock
    // epoch starts at 1_000_000)
    let window = host.window_of("fake-enc").unwrap();
    let now = 1_000_000u64;
    for n in 0..10 {
        window.record(now - 120_000 + n * 12_000, n % 2 == 0);
    }

    let events = host.tick_health().await;
    assert!(events
        .iter()
        .any(|e| matches!(e, cf_core::Event::PluginHealthChanged { health: PluginHealth::Restarting, .. })));
    assert_eq!(host.health_of("fake-enc"), Some(PluginHealth::Restarting));
}

#[tokio::test]
async fn shadow_upgrade_flips_and_rolls_back_on_regression() {
    let host = host_with_mesh();
    let old = host.encoder_for("h264", false).unwrap();

    let new_api = PluginApi::Encoder(Arc::new(FakeEncoder::default().gpu("vaapi")));
    let (new_manifest, _) = fake::full_mesh().remove(2);
    let events = host.shadow_upgrade("fake-enc", new_manifest, new_api).await.unwrap();
    assert!(!events.is_empty());

    let flipped = host.encoder_for("h264", false).unwrap();
    assert!(!Arc::ptr_eq(&old, &flipped));

    // Regress the new instance: error rate above 5%
    let window = host.window_of("fake-enc").unwrap();
    let now = 1_000_000u64;
    for n in 0..20 {
        window.record(now - 1_000 + n, n >= 18);
    }
    let _ = host.check_shadows(now);

    let rolled_back = host.encoder_for("h264", false).unwrap();
    assert!(Arc::ptr_eq(&old, &rolled_back));
}

#[tokio::test]
async fn shadow_upgrade_self_test_failure_keeps_prior() {
    let host = host_with_mesh();
    let old = host.encoder_for("h264", false).unwrap();

    let bad = FakeEncoder::default();
    bad.unhealthy.store(true, std::sync::atomic::Ordering::Relaxed);
    let (new_manifest, _) = fake::full_mesh().remove(2);
    let err = host
        .shadow_upgrade("fake-enc", new_manifest, PluginApi::Encoder(Arc::new(bad)))
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Plugin(_)));

    let still = host.encoder_for("h264", false).unwrap();
    assert!(Arc::ptr_eq(&old, &still));
}

#[tokio::test]
async fn publisher_contract_chat_and_endpoint() {
    let host = host_with_mesh();
    let publisher = host.publisher_for("twitch").unwrap();

    let endpoint = publisher.get_live_stream_endpoint("vault:twitch/creds").await.unwrap();
    assert!(endpoint.rtmp_url.starts_with("rtmp://"));
    assert!(!endpoint.stream_key.is_empty());

    publisher.send_chat_message("chan-1", "hello").await.unwrap();
    publisher.send_chat_message("chan-1", "world").await.unwrap();

    let page = publisher.get_chat_messages("chan-1", None).await.unwrap();
    assert_eq!(page.messages.len(), 2);
    assert_eq!(page.messages[0].text, "hello");

    // since_id pagination returns only newer messages
    let next = publisher
        .get_chat_messages("chan-1", page.messages.first().map(|m| m.id.as_str()))
        .await
        .unwrap();
    assert_eq!(next.messages.len(), 1);
    assert_eq!(next.messages[0].text, "world");
}

#[tokio::test]
async fn publisher_contract_retract() {
    let host = host_with_mesh();
    let publisher = host.publisher_for("kick").unwrap();

    let receipt = publisher
        .publish(crate::contracts::PublishRequest {
            platform: "kick".into(),
            title: "t".into(),
            description: String::new(),
            privacy: "public".into(),
            artifact_url: "fs://media/outputs/x.mp4".into(),
            credentials_ref: "vault:kick/creds".into(),
        })
        .await
        .unwrap();
    publisher.retract(&receipt.platform_id, "vault:kick/creds").await.unwrap();
}

#[test]
fn statuses_sorted_by_id() {
    let host = host_with_mesh();
    let statuses = host.statuses();
    assert_eq!(statuses.len(), 5);
    let ids: Vec<&str> = statuses.iter().map(|(id, _, _)| id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

// Tiny block_on helper for non-async assertions inside sync tests.
fn futures_block<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(fut)
}
