// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-socket protocol.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

mod request;
mod response;
mod wire;

pub use request::Request;
pub use response::{
    BrowseEntryDto, JobDetail, JobSummary, OutputEntry, PluginStatusEntry, Response, RestreamDto,
    StreamDetail, StreamSummary, TaskDetail,
};
pub use wire::{decode, encode, read_message, write_message, ProtocolError};
