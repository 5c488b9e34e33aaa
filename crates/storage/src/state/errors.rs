// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured error record handlers.

use cf_core::Event;

use super::{MaterializedState, MAX_ERROR_EVENTS};

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    if let Event::ErrorRecorded { error } = event {
        // Dedup on correlation id + code: replay must not double-record
        let dup = state
            .error_events
            .iter()
            .any(|e| e.correlation_id == error.correlation_id && e.code == error.code);
        if !dup {
            state.error_events.push(error.clone());
            if state.error_events.len() > MAX_ERROR_EVENTS {
                let excess = state.error_events.len() - MAX_ERROR_EVENTS;
                state.error_events.drain(..excess);
            }
        }
    }
}
