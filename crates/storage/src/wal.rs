// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL event write-ahead log with group commit.
//!
//! Each entry is one line: `{"seq":N,"at_ms":T,"event":{...}}\n`.
//! Appends buffer in memory and flush as a batch (interval or threshold)
//! with a single fsync, the durability point. Recovery replays entries
//! after the snapshot's sequence; a corrupt tail is rotated to `.bak`
//! with the valid prefix preserved.

use cf_core::Event;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Flush interval for group commit (~10ms batches)
const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Maximum entries to buffer before forcing flush
const FLUSH_THRESHOLD: usize = 100;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct RecordRef<'a> {
    seq: u64,
    at_ms: u64,
    event: &'a Event,
}

#[derive(Deserialize)]
struct Record {
    seq: u64,
    at_ms: u64,
    event: Event,
}

/// A journaled event with its sequence number and wall-clock stamp.
#[derive(Debug, Clone)]
pub struct WalEntry {
    pub seq: u64,
    pub at_ms: u64,
    pub event: Event,
}

/// Append-only event log.
pub struct Wal {
    file: File,
    path: PathBuf,
    /// Next sequence number to assign is `write_seq + 1`.
    write_seq: u64,
    /// Buffered JSON lines awaiting flush (without trailing newline).
    write_buffer: Vec<Vec<u8>>,
    last_flush: Instant,
}

impl Wal {
    /// Open or create a WAL. Scans for the highest sequence; a corrupt
    /// tail rotates the file to `.bak`, keeping the valid prefix.
    pub fn open(path: &Path) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).read(true).append(true).open(path)?;
        let (write_seq, corrupt_at) = scan(&file)?;

        let file = if let Some(offset) = corrupt_at {
            drop(file);
            rotate_corrupt(path, offset)?;
            OpenOptions::new().create(true).read(true).append(true).open(path)?
        } else {
            file
        };

        Ok(Self {
            file,
            path: path.to_owned(),
            write_seq,
            write_buffer: Vec::new(),
            last_flush: Instant::now(),
        })
    }

    /// Append an event. Returns the assigned sequence number; the entry
    /// is not durable until [`Wal::flush`].
    pub fn append(&mut self, event: &Event, at_ms: u64) -> Result<u64, WalError> {
        self.write_seq += 1;
        let seq = self.write_seq;
        let record = RecordRef { seq, at_ms, event };
        self.write_buffer.push(serde_json::to_vec(&record)?);
        Ok(seq)
    }

    /// Whether the group-commit window has closed.
    pub fn needs_flush(&self) -> bool {
        !self.write_buffer.is_empty()
            && (self.last_flush.elapsed() >= FLUSH_INTERVAL
                || self.write_buffer.len() >= FLUSH_THRESHOLD)
    }

    /// Write all buffered entries with a single fsync.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        for mut line in self.write_buffer.drain(..) {
            line.push(b'\n');
            self.file.write_all(&line)?;
        }
        self.file.sync_all()?;
        self.last_flush = Instant::now();
        Ok(())
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// All entries with `seq > after`, in order. Used for recovery replay.
    pub fn entries_after(&mut self, after: u64) -> Result<Vec<WalEntry>, WalError> {
        self.flush()?;
        let mut reader = BufReader::new(self.file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record: Record = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "corrupt WAL entry during replay, stopping");
                    break;
                }
            };
            if record.seq > after {
                entries.push(WalEntry {
                    seq: record.seq,
                    at_ms: record.at_ms,
                    event: record.event,
                });
            }
        }
        Ok(entries)
    }

    /// Drop entries at or below `seq` (post-checkpoint truncation).
    /// Rewrites to a temp file and renames atomically.
    pub fn truncate_through(&mut self, seq: u64) -> Result<(), WalError> {
        self.flush()?;

        let kept = self.entries_after(seq)?;
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for entry in &kept {
                let record = RecordRef { seq: entry.seq, at_ms: entry.at_ms, event: &entry.event };
                let mut line = serde_json::to_vec(&record)?;
                line.push(b'\n');
                tmp.write_all(&line)?;
            }
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new().create(true).read(true).append(true).open(&self.path)?;
        Ok(())
    }
}

/// Scan for the max sequence. Returns `(max_seq, Some(byte offset))` when
/// an unparseable line is hit.
fn scan(file: &File) -> Result<(u64, Option<u64>), WalError> {
    let mut reader = BufReader::new(file.try_clone()?);
    reader.seek(SeekFrom::Start(0))?;

    let mut max_seq = 0u64;
    let mut offset = 0u64;
    let mut line = String::new();
    loop {
        line.clear();
        let n = match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Ok((max_seq, Some(offset)));
            }
            Err(e) => return Err(e.into()),
        };
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            match serde_json::from_str::<Record>(trimmed) {
                Ok(record) => max_seq = max_seq.max(record.seq),
                Err(_) => return Ok((max_seq, Some(offset))),
            }
        }
        offset += n as u64;
    }
    Ok((max_seq, None))
}

/// Rotate a corrupt WAL to `.bak`, rewriting the original with only the
/// valid prefix (everything before `valid_up_to`).
fn rotate_corrupt(path: &Path, valid_up_to: u64) -> Result<(), WalError> {
    let bak = crate::snapshot::rotate_bak_path(path);
    warn!(
        path = %path.display(),
        bak = %bak.display(),
        valid_bytes = valid_up_to,
        "corrupt WAL tail, rotating to .bak and preserving valid prefix",
    );

    let mut src = File::open(path)?;
    let mut prefix = vec![0u8; valid_up_to as usize];
    std::io::Read::read_exact(&mut src, &mut prefix)?;
    drop(src);

    std::fs::rename(path, &bak)?;
    let mut fresh = File::create(path)?;
    fresh.write_all(&prefix)?;
    fresh.sync_all()?;
    Ok(())
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
