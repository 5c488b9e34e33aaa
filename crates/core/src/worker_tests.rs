// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn worker_id_behaves_like_str() {
    let id = WorkerId::new("w1");
    assert_eq!(id, "w1");
    assert_eq!(id.to_string(), "w1");

    use std::collections::HashMap;
    let mut map: HashMap<WorkerId, u32> = HashMap::new();
    map.insert(id, 1);
    assert_eq!(map.get("w1"), Some(&1));
}

#[test]
fn health_window() {
    let worker = Worker::builder().last_heartbeat_ms(10_000).build();
    assert!(worker.is_healthy(11_000, 5_000));
    assert!(!worker.is_healthy(15_000, 5_000));
    // Exactly at the boundary counts as unhealthy
    assert!(!worker.is_healthy(15_000, 5_000));
    // Clock skew (heartbeat in the future) never underflows
    assert!(worker.is_healthy(9_000, 5_000));
}

#[test]
fn default_caps_single_slot() {
    let caps = WorkerCaps::default();
    assert_eq!(caps.parallel_budget, 1);
    assert_eq!(caps.codecs, vec!["h264".to_string()]);
}
