// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::kernel;
use cf_core::{codes, ErrorKind};

#[tokio::test]
async fn sink_records_and_fans_out() {
    let k = kernel();
    let mut error_sub = k.bus.subscribe("events.error").unwrap();
    let mut audit_sub = k.bus.subscribe("audit.system").unwrap();

    let err = KernelError::new(ErrorKind::StorageExhausted, codes::STORAGE_EXHAUSTED, "disk full");
    let correlation = err.correlation_id.clone();
    k.engine.sink_error(&err);

    // State table
    let state = k.engine.state().lock();
    assert_eq!(state.error_events.len(), 1);
    assert_eq!(state.error_events[0].code, codes::STORAGE_EXHAUSTED);
    assert!(state.error_events[0].epoch_ms > 0, "sink stamps missing timestamps");
    drop(state);

    // Fan-out on events.error
    let message = error_sub.try_next().unwrap();
    assert_eq!(message.payload["code"], codes::STORAGE_EXHAUSTED);
    assert_eq!(message.payload["correlation_id"], correlation.as_str());

    // Audit trail carries the correlation id
    let audit = audit_sub.try_next().unwrap();
    assert_eq!(audit.payload["action"], "error");
    assert_eq!(audit.payload["correlation_id"], correlation.as_str());
}

#[tokio::test]
async fn sink_is_idempotent_per_correlation() {
    let k = kernel();
    let err = KernelError::new(ErrorKind::Transient, codes::TASK_EXEC_FAILED, "x").epoch_ms(5);
    k.engine.sink_error(&err);
    k.engine.sink_error(&err);

    assert_eq!(k.engine.state().lock().error_events.len(), 1);
}

#[tokio::test]
async fn sink_survives_bus_outage() {
    let k = kernel();
    k.bus.shutdown();
    let err = KernelError::new(ErrorKind::Internal, codes::INTERNAL, "late error").epoch_ms(1);
    // Must not panic or fail; the journal still gets the record
    k.engine.sink_error(&err);
    assert_eq!(k.engine.state().lock().error_events.len(), 1);
}
