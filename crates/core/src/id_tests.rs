// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::job::JobId;

#[test]
fn idbuf_roundtrips_str() {
    let b = IdBuf::new("job-abc");
    assert_eq!(b.as_str(), "job-abc");
    assert!(!b.is_empty());
}

#[test]
fn idbuf_empty() {
    let b = IdBuf::empty();
    assert!(b.is_empty());
    assert_eq!(b.as_str(), "");
}

#[test]
fn generated_ids_carry_prefix_and_fit() {
    let id = JobId::new();
    assert!(id.as_str().starts_with("job-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
    assert_ne!(JobId::new(), JobId::new());
}

#[test]
fn suffix_strips_prefix() {
    let id = JobId::from_string("job-1234");
    assert_eq!(id.suffix(), "1234");
    assert_eq!(id.short(2), "12");
}

#[test]
fn id_serde_is_transparent() {
    let id = JobId::from_string("job-x");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"job-x\"");
    let back: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn oversized_id_rejected_on_deserialize() {
    let long = format!("\"{}\"", "x".repeat(ID_MAX_LEN + 1));
    assert!(serde_json::from_str::<JobId>(&long).is_err());
}

#[test]
fn idbuf_borrow_matches_hash_lookup() {
    use std::collections::HashMap;
    let mut map: HashMap<JobId, u32> = HashMap::new();
    map.insert(JobId::from_string("job-k"), 7);
    assert_eq!(map.get("job-k"), Some(&7));
}
