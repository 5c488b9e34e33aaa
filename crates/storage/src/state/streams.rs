// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live stream event handlers.

use cf_core::Event;

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::StreamCreated { stream } => {
            if !state.streams.contains_key(stream.id.as_str()) {
                state.streams.insert(stream.id.to_string(), stream.clone());
            }
        }

        Event::StreamStarted { stream_id, epoch_ms } => {
            if let Some(stream) = state.streams.get_mut(stream_id.as_str()) {
                stream.go_live(*epoch_ms);
            }
        }

        Event::StreamEnded { stream_id, epoch_ms, archive_job_id } => {
            if let Some(stream) = state.streams.get_mut(stream_id.as_str()) {
                stream.end(*epoch_ms);
                if archive_job_id.is_some() {
                    stream.archive_job_id = *archive_job_id;
                }
            }
        }

        Event::StreamTelemetry { stream_id, is_live, viewers, .. } => {
            if let Some(stream) = state.streams.get_mut(stream_id.as_str()) {
                stream.is_live = *is_live;
                stream.viewers = *viewers;
                // Cumulative count only ratchets upward; idempotent via max
                stream.total_viewers = stream.total_viewers.max(*viewers);
            }
        }

        Event::RestreamAdded { stream_id, target } => {
            if let Some(stream) = state.streams.get_mut(stream_id.as_str()) {
                stream.upsert_restream(target.clone());
            }
        }

        Event::RestreamRemoved { stream_id, ingest_url } => {
            if let Some(stream) = state.streams.get_mut(stream_id.as_str()) {
                stream.remove_restream(ingest_url);
            }
        }

        Event::RestreamToggled { stream_id, ingest_url, enabled } => {
            if let Some(stream) = state.streams.get_mut(stream_id.as_str()) {
                if let Some(target) =
                    stream.restreams.iter_mut().find(|t| t.ingest_url == *ingest_url)
                {
                    target.enabled = *enabled;
                }
            }
        }

        Event::StreamDeleted { stream_id } => {
            state.streams.remove(stream_id.as_str());
        }

        _ => {}
    }
}
