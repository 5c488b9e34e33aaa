// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured error capture.
//!
//! Every error is logged once here (its origin) and once at the request
//! boundary by the listener, never in between. Records land in the
//! error table and fan out on `events.error` plus the audit stream.

use crate::runtime::Engine;
use crate::wire::subjects;
use cf_core::{Clock, Event, KernelError, Severity};
use tracing::{error, warn};

impl<C: Clock + 'static> Engine<C> {
    /// Capture a structured error.
    ///
    /// Severity drives the log level; the record keeps its original
    /// correlation ID so boundary logs tie back to it. Callers must not
    /// place secret references in `details`.
    pub fn sink_error(&self, err: &KernelError) {
        match err.kind.severity() {
            Severity::Warn => warn!(code = %err.code, correlation = %err.correlation_id, "{}", err.message),
            Severity::Error | Severity::Critical => {
                error!(code = %err.code, correlation = %err.correlation_id, "{}", err.message)
            }
        }

        let mut stamped = err.clone();
        if stamped.epoch_ms == 0 {
            stamped.epoch_ms = self.clock.epoch_ms();
        }
        if let Err(e) = self.record(vec![Event::ErrorRecorded { error: stamped.clone() }]) {
            // The sink must never fail its caller; a journaling error
            // here still leaves the tracing line above.
            warn!(error = %e, "error record not journaled");
        }

        self.publish_json(subjects::EVENTS_ERROR, &stamped);
        self.audit(
            subjects::AUDIT_SYSTEM,
            "error",
            "kernel",
            "error",
            &stamped.code,
            &stamped.correlation_id,
        );
    }
}

#[cfg(test)]
#[path = "error_sink_tests.rs"]
mod tests;
