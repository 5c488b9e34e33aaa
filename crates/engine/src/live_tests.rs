// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::kernel;
use cf_plugin::contracts::IngestTelemetry;

#[tokio::test]
async fn create_stream_provisions_ingest() {
    let k = kernel();
    let (id, key, ingest_url) = k.engine.create_stream("user-1", "gig night", false).await.unwrap();

    assert_eq!(key.len(), 22);
    assert!(ingest_url.contains(&key));

    let state = k.engine.state().lock();
    let stream = state.get_stream(id.as_str()).unwrap();
    assert!(!stream.is_live);
    assert!(stream.ingest_session_id.is_some());
    assert!(stream.playback_url.is_some());
}

#[tokio::test]
async fn ingest_authorization_checks_the_key() {
    let k = kernel();
    let (id, key, _) = k.engine.create_stream("user-1", "gig", false).await.unwrap();

    assert!(!k.engine.authorize_ingest(id.as_str(), "wrong-key").unwrap());
    assert!(!k.engine.state().lock().get_stream(id.as_str()).unwrap().is_live);

    assert!(k.engine.authorize_ingest(id.as_str(), &key).unwrap());
    assert!(k.engine.state().lock().get_stream(id.as_str()).unwrap().is_live);
}

#[tokio::test]
async fn authorize_unknown_stream_errors() {
    let k = kernel();
    let err = k.engine.authorize_ingest("str-nope", "key").unwrap_err();
    assert!(matches!(err, EngineError::StreamNotFound(_)));
}

#[tokio::test]
async fn telemetry_tick_fans_out_per_stream() {
    let k = kernel();
    let (id, key, _) = k.engine.create_stream("user-1", "gig", false).await.unwrap();
    k.engine.authorize_ingest(id.as_str(), &key).unwrap();

    let session_id = k
        .engine
        .state()
        .lock()
        .get_stream(id.as_str())
        .unwrap()
        .ingest_session_id
        .clone()
        .unwrap();
    k.live.set_telemetry(
        &session_id,
        IngestTelemetry { is_live: true, bitrate: 4_000_000, fps: 60.0, viewers: 42 },
    );

    let mut sub = k.bus.subscribe("live.telemetry.>").unwrap();
    k.engine.telemetry_tick().await;

    let message = sub.try_next().unwrap();
    assert_eq!(message.subject, format!("live.telemetry.{id}"));
    assert_eq!(message.payload["viewers"], 42);

    let state = k.engine.state().lock();
    let stream = state.get_stream(id.as_str()).unwrap();
    assert_eq!(stream.viewers, 42);
    assert_eq!(stream.total_viewers, 42);
}

#[tokio::test]
async fn restreams_are_applied_to_live_sessions() {
    let k = kernel();
    let (id, key, _) = k.engine.create_stream("user-1", "gig", false).await.unwrap();
    k.engine.authorize_ingest(id.as_str(), &key).unwrap();

    k.engine.add_restream(id.as_str(), "twitch", Some("rtmp://twitch/app"), None).await.unwrap();
    let session_id = k
        .engine
        .state()
        .lock()
        .get_stream(id.as_str())
        .unwrap()
        .ingest_session_id
        .clone()
        .unwrap();
    assert_eq!(k.live.sessions.lock()[&session_id].targets, vec!["rtmp://twitch/app"]);

    k.engine.toggle_restream(id.as_str(), "rtmp://twitch/app", false).await.unwrap();
    assert!(k.live.sessions.lock()[&session_id].targets.is_empty());

    k.engine.toggle_restream(id.as_str(), "rtmp://twitch/app", true).await.unwrap();
    assert_eq!(k.live.sessions.lock()[&session_id].targets.len(), 1);

    k.engine.remove_restream(id.as_str(), "rtmp://twitch/app").await.unwrap();
    assert!(k.live.sessions.lock()[&session_id].targets.is_empty());
    assert!(k.engine.state().lock().get_stream(id.as_str()).unwrap().restreams.is_empty());
}

#[tokio::test]
async fn restream_without_url_acquires_publisher_endpoint() {
    let k = kernel();
    let (id, key, _) = k.engine.create_stream("user-1", "gig", false).await.unwrap();
    k.engine.authorize_ingest(id.as_str(), &key).unwrap();

    let url = k
        .engine
        .add_restream(id.as_str(), "twitch", None, Some("vault:twitch/creds"))
        .await
        .unwrap();
    assert_eq!(url, "rtmp://live.example/app/remote-key");

    let state = k.engine.state().lock();
    let stream = state.get_stream(id.as_str()).unwrap();
    assert_eq!(stream.restreams[0].ingest_url, url);
}

#[tokio::test]
async fn restream_endpoint_for_unknown_platform_fails() {
    let k = kernel();
    let (id, _, _) = k.engine.create_stream("user-1", "gig", false).await.unwrap();
    let err = k
        .engine
        .add_restream(id.as_str(), "rumble", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Route(_)));
}

#[tokio::test]
async fn restreams_persist_when_offline_and_reconcile() {
    let k = kernel();
    let (id, key, _) = k.engine.create_stream("user-1", "gig", false).await.unwrap();

    // Added before going live: persisted, not yet applied
    k.engine.add_restream(id.as_str(), "kick", Some("rtmp://kick/app"), None).await.unwrap();
    let session_id = k
        .engine
        .state()
        .lock()
        .get_stream(id.as_str())
        .unwrap()
        .ingest_session_id
        .clone()
        .unwrap();
    assert!(k.live.sessions.lock()[&session_id].targets.is_empty());

    k.engine.authorize_ingest(id.as_str(), &key).unwrap();
    k.engine.reconcile_restreams().await.unwrap();
    assert_eq!(k.live.sessions.lock()[&session_id].targets, vec!["rtmp://kick/app"]);
}

#[tokio::test]
async fn end_stream_synthesizes_archive_job() {
    let k = kernel();
    k.heartbeat("w1", 2);
    let (id, key, _) = k.engine.create_stream("user-1", "gig", true).await.unwrap();
    k.engine.authorize_ingest(id.as_str(), &key).unwrap();

    let archive = k.engine.end_stream(id.as_str()).await.unwrap().unwrap();

    let state = k.engine.state().lock();
    let stream = state.get_stream(id.as_str()).unwrap();
    assert!(!stream.is_live);
    assert_eq!(stream.archive_job_id, Some(archive));

    let job = &state.jobs[archive.as_str()];
    assert_eq!(job.source, cf_core::JobSource::Stream { stream_id: id });
    assert_eq!(job.owner, "user-1");
    assert!(!state.tasks_of(archive.as_str()).is_empty());
}

#[tokio::test]
async fn end_stream_without_archive_skips_vod() {
    let k = kernel();
    let (id, key, _) = k.engine.create_stream("user-1", "gig", false).await.unwrap();
    k.engine.authorize_ingest(id.as_str(), &key).unwrap();

    let archive = k.engine.end_stream(id.as_str()).await.unwrap();
    assert!(archive.is_none());
    assert!(k.engine.state().lock().jobs.is_empty());
}
