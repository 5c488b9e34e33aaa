// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lookup helpers shared by the state modules.

use std::collections::HashMap;

/// Find a value by exact key or unique key prefix.
///
/// Prefix lookup only resolves when exactly one key matches; ambiguous
/// prefixes return `None` so callers never act on the wrong record.
pub(crate) fn find_by_prefix<'a, V>(map: &'a HashMap<String, V>, id: &str) -> Option<&'a V> {
    if let Some(v) = map.get(id) {
        return Some(v);
    }
    let mut hit = None;
    for (key, value) in map {
        if key.starts_with(id) {
            if hit.is_some() {
                return None;
            }
            hit = Some(value);
        }
    }
    hit
}
