// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    first = { 1, 5_000 },
    second = { 2, 10_000 },
    third = { 3, 20_000 },
    capped = { 10, 300_000 },
)]
fn delay_doubles_until_cap(attempt: u32, expected_ms: u64) {
    let backoff = Backoff::default();
    assert_eq!(backoff.delay(attempt), Duration::from_millis(expected_ms));
}

#[test]
fn zero_attempts_waits_base() {
    // Attempt 0 never happens in practice; the curve still stays sane.
    assert_eq!(Backoff::default().delay(0), Duration::from_millis(5_000));
}

#[test]
fn huge_attempt_does_not_overflow() {
    let backoff = Backoff::default();
    assert_eq!(backoff.delay(u32::MAX), Duration::from_millis(300_000));
}

#[test]
fn exhaustion_at_max_attempts() {
    let backoff = Backoff::default();
    assert!(!backoff.exhausted(2));
    assert!(backoff.exhausted(3));
    assert!(backoff.exhausted(4));

    let custom = Backoff::with_max_attempts(5);
    assert!(!custom.exhausted(4));
    assert!(custom.exhausted(5));
}
