// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dot-separated subject names with single-token `*` wildcards.
//!
//! `jobs.*` matches `jobs.dispatch` but not `jobs.dispatch.retry`;
//! a trailing `>` matches any remaining tokens (`live.telemetry.>`).

/// True when `subject` matches `pattern`.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pat = pattern.split('.');
    let mut sub = subject.split('.');

    loop {
        match (pat.next(), sub.next()) {
            (Some(">"), _) => return true,
            (Some(p), Some(s)) => {
                if p != "*" && p != s {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Validate a concrete (non-pattern) subject: non-empty dot tokens,
/// no wildcard characters.
pub fn is_valid_subject(subject: &str) -> bool {
    !subject.is_empty()
        && subject
            .split('.')
            .all(|tok| !tok.is_empty() && tok != "*" && tok != ">")
}

#[cfg(test)]
#[path = "subject_tests.rs"]
mod tests;
