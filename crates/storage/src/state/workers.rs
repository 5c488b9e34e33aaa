// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker fleet event handlers.

use cf_core::Event;

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::WorkerSeen { worker } => {
            // Heartbeat upsert: assignment, so replay is idempotent
            state.workers.insert(worker.id.as_str().to_string(), worker.clone());
        }

        Event::WorkerLost { worker_id, .. } => {
            // The record stays (capabilities are useful for display);
            // its tasks are reverted by separate task:reverted events.
            if let Some(worker) = state.workers.get_mut(worker_id.as_str()) {
                worker.last_heartbeat_ms = 0;
            }
        }

        Event::WorkerDeleted { worker_id } => {
            state.workers.remove(worker_id.as_str());
        }

        _ => {}
    }
}
