// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cf_core::JobSource;

#[test]
fn requests_tag_by_type() {
    let request = Request::JobCreate {
        owner: "user-1".into(),
        source: JobSource::Url { url: "https://cdn/in.mp4".into() },
        profile: Some("1080p_h264".into()),
        profile_inline: None,
        publish_targets: vec![],
        webhook_urls: vec![],
    };
    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["type"], "JobCreate");
    assert_eq!(json["source"]["type"], "url");

    let back: Request = serde_json::from_value(json).unwrap();
    assert_eq!(back, request);
}

#[test]
fn stream_key_rides_only_in_ingest_auth() {
    let request = Request::IngestAuth { id: "str-1".into(), stream_key: "k".repeat(22) };
    let json = serde_json::to_string(&request).unwrap();
    let back: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(back, request);
}

#[test]
fn plugin_configure_accepts_secret_refs() {
    let mut config = HashMap::new();
    config.insert("bucket".to_string(), "media".to_string());
    config.insert("credentials_ref".to_string(), "vault:s3/prod".to_string());
    let request = Request::PluginConfigure { plugin_id: "s3-store".into(), config };

    let json = serde_json::to_string(&request).unwrap();
    let back: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(back, request);
}

#[test]
fn unknown_request_type_fails_parse() {
    let err = serde_json::from_str::<Request>("{\"type\":\"Nope\"}");
    assert!(err.is_err());
}
