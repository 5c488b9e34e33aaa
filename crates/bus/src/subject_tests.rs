// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    exact = { "jobs.dispatch", "jobs.dispatch", true },
    star_tail = { "jobs.*", "jobs.dispatch", true },
    star_too_deep = { "jobs.*", "jobs.dispatch.retry", false },
    star_mid = { "live.*.stats", "live.str1.stats", true },
    gt_tail = { "live.telemetry.>", "live.telemetry.str1.cpu", true },
    gt_requires_nothing = { "audit.>", "audit.user_action", true },
    mismatch = { "jobs.*", "tasks.dispatch", false },
    shorter_subject = { "jobs.dispatch", "jobs", false },
    longer_subject = { "jobs", "jobs.dispatch", false },
)]
fn pattern_matching(pattern: &str, subject: &str, expected: bool) {
    assert_eq!(matches(pattern, subject), expected);
}

#[parameterized(
    plain = { "jobs.dispatch", true },
    deep = { "live.telemetry.str-1", true },
    empty = { "", false },
    empty_token = { "jobs..dispatch", false },
    wildcard = { "jobs.*", false },
    gt = { "jobs.>", false },
)]
fn subject_validity(subject: &str, expected: bool) {
    assert_eq!(is_valid_subject(subject), expected);
}
