// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured kernel errors.
//!
//! Every error crossing a subsystem boundary carries a stable machine
//! code (family-dashed, e.g. `JOB-008`), a kind from the taxonomy, a
//! human message, an optional details payload, and a correlation ID.
//! Errors are logged once at their origin and once at the request
//! boundary, never in between.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable machine-readable error codes, grouped by family.
pub mod codes {
    pub const JOB_VALIDATION: &str = "JOB-001";
    pub const JOB_NOT_FOUND: &str = "JOB-002";
    pub const JOB_TERMINAL: &str = "JOB-003";
    pub const JOB_ATTEMPTS_EXHAUSTED: &str = "JOB-008";

    pub const TASK_NOT_FOUND: &str = "TASK-001";
    pub const TASK_EXEC_FAILED: &str = "TASK-002";
    pub const TASK_STUCK: &str = "TASK-003";
    pub const TASK_CORRUPT_INPUT: &str = "TASK-004";

    pub const AUTH_FAILED: &str = "AUTH-001";
    pub const AUTHZ_DENIED: &str = "AUTH-002";
    pub const AUTH_UNAVAILABLE: &str = "AUTH-003";

    pub const PLUGIN_HANDSHAKE: &str = "PLUG-001";
    pub const PLUGIN_DEGRADED: &str = "PLUG-002";
    pub const PLUGIN_CRASHED: &str = "PLUG-003";
    pub const PLUGIN_DISABLED: &str = "PLUG-004";
    pub const NO_STORAGE_FOR_SCHEME: &str = "PLUG-005";
    pub const NO_ENCODER_FOR_CODEC: &str = "PLUG-006";
    pub const NO_PUBLISHER_FOR_PLATFORM: &str = "PLUG-007";
    pub const NO_LIVE_FOR_PROTOCOL: &str = "PLUG-008";

    pub const STREAM_NOT_FOUND: &str = "LIVE-001";
    pub const STREAM_KEY_REJECTED: &str = "LIVE-002";

    pub const STORAGE_EXHAUSTED: &str = "STOR-001";
    pub const BUS_UNAVAILABLE: &str = "BUS-001";
    pub const PUBLISH_FAILED: &str = "PUB-001";
    pub const INTERNAL: &str = "CORE-001";
}

/// Error taxonomy. Kinds drive propagation policy, not type identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input; reported immediately to the submitter.
    Validation,
    NotFound,
    AuthFailed,
    AuthzDenied,
    /// Plugin unhealthy; routed around if alternatives exist.
    PluginDegraded,
    /// Plugin process died; pending calls fail retryable.
    PluginCrashed,
    /// Network, timeout, OOM; task-level retry with backoff.
    Transient,
    /// Corrupt input, unsupported format; no retry.
    Permanent,
    /// Out of storage; job fails and an admin alert is raised.
    StorageExhausted,
    /// Bus transport unreachable; new submissions refused.
    BusUnavailable,
    Internal,
}

crate::simple_display! {
    ErrorKind {
        Validation => "validation",
        NotFound => "not_found",
        AuthFailed => "auth_failed",
        AuthzDenied => "authz_denied",
        PluginDegraded => "plugin_degraded",
        PluginCrashed => "plugin_crashed",
        Transient => "transient",
        Permanent => "permanent",
        StorageExhausted => "storage_exhausted",
        BusUnavailable => "bus_unavailable",
        Internal => "internal",
    }
}

impl ErrorKind {
    /// Whether a failure of this kind is worth another attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::PluginCrashed)
    }

    pub fn severity(&self) -> Severity {
        match self {
            ErrorKind::Validation | ErrorKind::NotFound => Severity::Warn,
            ErrorKind::AuthFailed | ErrorKind::AuthzDenied => Severity::Warn,
            ErrorKind::Transient => Severity::Warn,
            ErrorKind::PluginDegraded | ErrorKind::PluginCrashed | ErrorKind::Permanent => {
                Severity::Error
            }
            ErrorKind::StorageExhausted | ErrorKind::BusUnavailable | ErrorKind::Internal => {
                Severity::Critical
            }
        }
    }
}

/// Severity classification used by the error sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warn,
    Error,
    Critical,
}

crate::simple_display! {
    Severity {
        Warn => "warn",
        Error => "error",
        Critical => "critical",
    }
}

/// A structured kernel error.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{code} [{kind}] {message}")]
pub struct KernelError {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Propagated across subsystem boundaries to tie audit records together.
    pub correlation_id: String,
    pub epoch_ms: u64,
}

impl KernelError {
    pub fn new(kind: ErrorKind, code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            kind,
            message: message.into(),
            details: None,
            correlation_id: new_correlation_id(),
            epoch_ms: 0,
        }
    }

    crate::setters! {
        into {
            correlation_id: String,
        }
        set {
            epoch_ms: u64,
            details: Option<serde_json::Value>,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }

    /// Classify a task execution exit code into an error kind.
    ///
    /// 137 = OOM kill, 255 = timeout, 1 = generic failure (all transient);
    /// 69 = corrupt/unsupported input (permanent).
    pub fn from_exit_code(code: i32, message: impl Into<String>) -> Self {
        let (kind, error_code) = match code {
            69 => (ErrorKind::Permanent, codes::TASK_CORRUPT_INPUT),
            137 | 255 | 1 => (ErrorKind::Transient, codes::TASK_EXEC_FAILED),
            _ => (ErrorKind::Transient, codes::TASK_EXEC_FAILED),
        };
        Self::new(kind, error_code, message)
            .details(Some(serde_json::json!({ "exit_code": code })))
    }
}

/// Fresh correlation ID (hyphen-free UUID, compact in log lines).
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
