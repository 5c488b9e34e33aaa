// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cf-core: data model and shared primitives for the castforge kernel.
//!
//! Everything the other crates agree on lives here: record types for jobs,
//! tasks, live streams, workers, and plugin instances; the kernel event
//! enum; the error taxonomy; the unified retry policy; and the clock
//! abstraction used to make time-dependent logic testable.

pub mod macros;

pub mod clock;
pub mod error;
pub mod event;
pub mod id;
pub mod job;
pub mod plugin;
pub mod retry;
pub mod stream;
pub mod task;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{codes, ErrorKind, KernelError, Severity};
pub use event::Event;
pub use id::IdBuf;
pub use job::{
    EncodeProfile, Job, JobConfig, JobId, JobSource, JobState, PublishOutcome, PublishStatus,
    PublishTarget,
};
pub use plugin::{
    is_secret_ref_key, redacted_config, validate_config, CapabilitySet, ConfigError, ConfigField,
    PluginHealth, PluginManifest, PluginType, PROTOCOL_VERSION,
};
pub use retry::Backoff;
pub use stream::{new_stream_key, LiveStream, RestreamStats, RestreamTarget, StreamId};
pub use task::{validate_plan, PlanError, Task, TaskId, TaskStatus};
pub use worker::{Worker, WorkerCaps, WorkerId};
