// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin subprocess lifecycle.
//!
//! The host launches each plugin as a child process with piped stdio:
//! stdin/stdout carry the JSONL RPC, stderr is forwarded to tracing.
//! Shutdown is SIGTERM first, SIGKILL after a grace period.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

/// Grace period between SIGTERM and SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("plugin process has no stdio pipes")]
    MissingPipes,
}

/// A running plugin subprocess and its RPC pipes.
#[derive(Debug)]
pub struct PluginProcess {
    child: Child,
    pub plugin_id: String,
}

/// Stdio handles split out for the RPC client.
pub struct ProcessPipes {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

impl PluginProcess {
    /// Spawn `command` in `dir` with the shared magic cookie exported in
    /// the environment. Stderr lines are forwarded to tracing under the
    /// plugin's id.
    pub fn spawn(
        plugin_id: &str,
        dir: &Path,
        command: &str,
        args: &[String],
        cookie: &str,
    ) -> Result<(Self, ProcessPipes), ProcessError> {
        let mut child = Command::new(command)
            .args(args)
            .current_dir(dir)
            .env(crate::rpc::MAGIC_COOKIE_ENV, cookie)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::Spawn { command: command.to_string(), source: e })?;

        let stdin = child.stdin.take().ok_or(ProcessError::MissingPipes)?;
        let stdout = child.stdout.take().ok_or(ProcessError::MissingPipes)?;

        if let Some(stderr) = child.stderr.take() {
            let id = plugin_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(plugin = %id, "{line}");
                }
            });
        }

        debug!(plugin = %plugin_id, command, "plugin process spawned");
        Ok((
            Self { child, plugin_id: plugin_id.to_string() },
            ProcessPipes { stdin, stdout },
        ))
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Graceful stop: SIGTERM, wait out the grace period, then SIGKILL.
    /// Plugins that honor cancellation exit on the SIGTERM.
    pub async fn stop(mut self) {
        if let Some(pid) = self.child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(plugin = %self.plugin_id, error = %e, "SIGTERM failed");
            }
            match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
                Ok(_) => return,
                Err(_) => {
                    warn!(plugin = %self.plugin_id, "grace period elapsed, killing");
                }
            }
        }
        let _ = self.child.kill().await;
    }

    /// Non-blocking liveness check.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}
