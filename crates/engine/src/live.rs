// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live-relay control: ingest sessions, telemetry fan-out, restream
//! destinations, archive-on-end VOD synthesis.

use crate::runtime::{Engine, EngineError, SubmitJob};
use crate::wire::subjects;
use cf_core::{
    Clock, Event, JobId, JobSource, LiveStream, RestreamStats, RestreamTarget, StreamId,
};
use cf_plugin::contracts::IngestConfig;
use serde_json::json;
use tracing::{info, warn};

/// Ingest protocol used when a stream doesn't specify one.
const DEFAULT_INGEST_PROTOCOL: &str = "rtmp";

impl<C: Clock + 'static> Engine<C> {
    /// Create a stream record and its ingest session.
    ///
    /// The returned tuple is `(id, stream_key, ingest_url)`; the key is
    /// handed to the owner once and never logged.
    pub async fn create_stream(
        &self,
        owner: &str,
        title: &str,
        archive_enabled: bool,
    ) -> Result<(StreamId, String, String), EngineError> {
        let mut stream = LiveStream::new(owner, title, archive_enabled, self.clock.epoch_ms());

        let live = self.host.live_for(DEFAULT_INGEST_PROTOCOL)?;
        let session = live
            .start_ingest(IngestConfig {
                stream_id: stream.id.to_string(),
                protocol: DEFAULT_INGEST_PROTOCOL.to_string(),
                stream_key: stream.stream_key.clone(),
            })
            .await?;
        stream.ingest_session_id = Some(session.id);
        stream.ingest_url = Some(session.ingest_url.clone());
        stream.playback_url = Some(session.playback_url);

        let id = stream.id;
        let key = stream.stream_key.clone();
        self.record(vec![Event::StreamCreated { stream }])?;
        self.audit(
            subjects::AUDIT_USER_ACTION,
            "stream.create",
            owner,
            "stream",
            id.as_str(),
            &cf_core::error::new_correlation_id(),
        );
        info!(stream = %id, "live stream created");
        Ok((id, key, session.ingest_url))
    }

    /// Ingest authorization callback from the live plugin: the publish
    /// is allowed only when the key matches and the stream is enabled.
    pub fn authorize_ingest(&self, stream_id: &str, presented_key: &str) -> Result<bool, EngineError> {
        let (id, allowed) = {
            let state = self.state.lock();
            let stream = state
                .get_stream(stream_id)
                .ok_or_else(|| EngineError::StreamNotFound(stream_id.to_string()))?;
            (stream.id, stream.key_matches(presented_key))
        };
        if !allowed {
            warn!(stream = %id, "ingest denied: bad stream key");
            return Ok(false);
        }

        self.record(vec![Event::StreamStarted { stream_id: id, epoch_ms: self.clock.epoch_ms() }])?;
        self.publish_json(
            &subjects::live_lifecycle(id.as_str()),
            &json!({ "stream_id": id, "event": "started" }),
        );
        Ok(true)
    }

    /// End a stream. Archive-enabled streams synthesize a VOD job from
    /// the recorded segments and hand it to the scheduler; the stream
    /// record keeps the job ID.
    pub async fn end_stream(&self, stream_id: &str) -> Result<Option<JobId>, EngineError> {
        let (id, owner, session, archive_enabled, was_live) = {
            let state = self.state.lock();
            let stream = state
                .get_stream(stream_id)
                .ok_or_else(|| EngineError::StreamNotFound(stream_id.to_string()))?;
            (
                stream.id,
                stream.owner.clone(),
                stream.ingest_session_id.clone(),
                stream.archive_enabled,
                stream.is_live,
            )
        };

        if let Some(session_id) = &session {
            let live = self.host.live_for(DEFAULT_INGEST_PROTOCOL)?;
            if let Err(e) = live.stop_ingest(session_id).await {
                warn!(stream = %id, error = %e, "stop_ingest failed; ending anyway");
            }
        }

        let archive_job_id = if archive_enabled && was_live {
            match self
                .submit_job(SubmitJob {
                    owner,
                    source: JobSource::Stream { stream_id: id },
                    profile_name: None,
                    profile_inline: None,
                    publish_targets: Vec::new(),
                    webhook_urls: Vec::new(),
                })
                .await
            {
                Ok(job_id) => Some(job_id),
                Err(e) => {
                    let error = e.to_kernel(self.clock.epoch_ms());
                    self.sink_error(&error);
                    None
                }
            }
        } else {
            None
        };

        self.record(vec![Event::StreamEnded {
            stream_id: id,
            epoch_ms: self.clock.epoch_ms(),
            archive_job_id,
        }])?;
        self.publish_json(
            &subjects::live_lifecycle(id.as_str()),
            &json!({ "stream_id": id, "event": "stopped" }),
        );
        info!(stream = %id, archived = archive_job_id.is_some(), "stream ended");
        Ok(archive_job_id)
    }

    /// Add a restream destination. Applied to the live session
    /// immediately when the stream is on air; persisted either way and
    /// reconciled at startup.
    ///
    /// With no explicit ingest URL the endpoint is acquired from the
    /// platform's publisher plugin (`credentials_ref` stays an opaque
    /// reference the plugin resolves itself).
    pub async fn add_restream(
        &self,
        stream_id: &str,
        platform: &str,
        ingest_url: Option<&str>,
        credentials_ref: Option<&str>,
    ) -> Result<String, EngineError> {
        let (id, session, is_live) = self.stream_session(stream_id)?;

        let resolved_url = match ingest_url {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => {
                let publisher = self.host.publisher_for(platform)?;
                let endpoint = publisher
                    .get_live_stream_endpoint(credentials_ref.unwrap_or_default())
                    .await?;
                format!("{}/{}", endpoint.rtmp_url, endpoint.stream_key)
            }
        };

        self.record(vec![Event::RestreamAdded {
            stream_id: id,
            target: RestreamTarget {
                platform: platform.to_string(),
                ingest_url: resolved_url.clone(),
                enabled: true,
                last_stats: Some(RestreamStats::default()),
            },
        }])?;
        if is_live {
            if let Some(session_id) = session {
                let live = self.host.live_for(DEFAULT_INGEST_PROTOCOL)?;
                live.add_output_target(&session_id, &resolved_url).await?;
            }
        }
        Ok(resolved_url)
    }

    pub async fn remove_restream(&self, stream_id: &str, ingest_url: &str) -> Result<(), EngineError> {
        let (id, session, is_live) = self.stream_session(stream_id)?;
        self.record(vec![Event::RestreamRemoved {
            stream_id: id,
            ingest_url: ingest_url.to_string(),
        }])?;
        if is_live {
            if let Some(session_id) = session {
                let live = self.host.live_for(DEFAULT_INGEST_PROTOCOL)?;
                live.remove_output_target(&session_id, ingest_url).await?;
            }
        }
        Ok(())
    }

    /// Start/stop an existing destination without forgetting it.
    pub async fn toggle_restream(
        &self,
        stream_id: &str,
        ingest_url: &str,
        enabled: bool,
    ) -> Result<(), EngineError> {
        let (id, session, is_live) = self.stream_session(stream_id)?;
        self.record(vec![Event::RestreamToggled {
            stream_id: id,
            ingest_url: ingest_url.to_string(),
            enabled,
        }])?;
        if is_live {
            if let Some(session_id) = session {
                let live = self.host.live_for(DEFAULT_INGEST_PROTOCOL)?;
                if enabled {
                    live.add_output_target(&session_id, ingest_url).await?;
                } else {
                    live.remove_output_target(&session_id, ingest_url).await?;
                }
            }
        }
        Ok(())
    }

    /// Pull telemetry for every on-air stream and fan it out on the
    /// ephemeral stream. Runs on the telemetry timer.
    pub(crate) async fn telemetry_tick(&self) {
        let targets: Vec<(StreamId, String)> = {
            let state = self.state.lock();
            state
                .streams
                .values()
                .filter(|s| s.is_live)
                .filter_map(|s| s.ingest_session_id.clone().map(|sid| (s.id, sid)))
                .collect()
        };
        if targets.is_empty() {
            return;
        }
        let Ok(live) = self.host.live_for(DEFAULT_INGEST_PROTOCOL) else {
            return;
        };

        for (stream_id, session_id) in targets {
            match live.get_telemetry(&session_id).await {
                Ok(t) => {
                    let _ = self.record(vec![Event::StreamTelemetry {
                        stream_id,
                        is_live: t.is_live,
                        bitrate: t.bitrate,
                        fps: t.fps,
                        viewers: t.viewers,
                    }]);
                    self.publish_json(
                        &subjects::live_telemetry(stream_id.as_str()),
                        &json!({
                            "stream_id": stream_id,
                            "is_live": t.is_live,
                            "bitrate": t.bitrate,
                            "fps": t.fps,
                            "viewers": t.viewers,
                        }),
                    );
                }
                Err(e) => warn!(stream = %stream_id, error = %e, "telemetry pull failed"),
            }
        }
    }

    /// Startup reconciliation: reapply enabled restream destinations of
    /// on-air streams to the live plugin.
    pub async fn reconcile_restreams(&self) -> Result<(), EngineError> {
        let targets: Vec<(String, String)> = {
            let state = self.state.lock();
            state
                .streams
                .values()
                .filter(|s| s.is_live)
                .filter_map(|s| {
                    s.ingest_session_id.as_ref().map(|sid| {
                        s.restreams
                            .iter()
                            .filter(|t| t.enabled)
                            .map(|t| (sid.clone(), t.ingest_url.clone()))
                            .collect::<Vec<_>>()
                    })
                })
                .flatten()
                .collect()
        };
        if targets.is_empty() {
            return Ok(());
        }
        let live = self.host.live_for(DEFAULT_INGEST_PROTOCOL)?;
        for (session_id, ingest_url) in targets {
            if let Err(e) = live.add_output_target(&session_id, &ingest_url).await {
                warn!(session = %session_id, target = %ingest_url, error = %e, "restream reconcile failed");
            }
        }
        Ok(())
    }

    fn stream_session(
        &self,
        stream_id: &str,
    ) -> Result<(StreamId, Option<String>, bool), EngineError> {
        let state = self.state.lock();
        let stream = state
            .get_stream(stream_id)
            .ok_or_else(|| EngineError::StreamNotFound(stream_id.to_string()))?;
        Ok((stream.id, stream.ingest_session_id.clone(), stream.is_live))
    }
}

#[cfg(test)]
#[path = "live_tests.rs"]
mod tests;
