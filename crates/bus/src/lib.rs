// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cf-bus: named streams with retention policies and subject pub/sub.
//!
//! Three retention contracts back the kernel's wire subjects:
//!
//! | retention | storage | delivery |
//! |---|---|---|
//! | work-queue | durable | exactly one in-flight consumer per message, ack deletes, redelivery after ack-wait |
//! | age-limited | durable | at-least-once fan-out to matching subscribers |
//! | ephemeral | memory | best-effort fan-out, short age cap |
//!
//! Per-producer per-subject FIFO holds; nothing is guaranteed across
//! subjects. Durable streams append JSONL records so the work queue
//! survives a restart with its unacknowledged messages intact.

pub mod subject;

use cf_core::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default redelivery window for unacknowledged work messages.
pub const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(30);

/// Fan-out channel depth per subscriber. A slow subscriber on a durable
/// stream sees redelivery pressure, not kernel backpressure.
const SUBSCRIBER_BUFFER: usize = 256;

/// Retention contract for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Retention {
    /// Ack-deletes; each message visible to one consumer at a time.
    WorkQueue,
    /// Durable, pruned once older than `max_age_ms`.
    AgeLimited { max_age_ms: u64 },
    /// Memory only, pruned aggressively.
    Ephemeral { max_age_ms: u64 },
}

impl Retention {
    pub fn is_durable(&self) -> bool {
        !matches!(self, Retention::Ephemeral { .. })
    }
}

/// Declaration of a named stream and the subjects it captures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPolicy {
    pub name: String,
    /// Subject patterns this stream captures (first match wins on publish).
    pub subjects: Vec<String>,
    pub retention: Retention,
}

impl StreamPolicy {
    pub fn work(name: &str, subjects: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            retention: Retention::WorkQueue,
        }
    }

    pub fn age_limited(name: &str, subjects: &[&str], max_age: Duration) -> Self {
        Self {
            name: name.to_string(),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            retention: Retention::AgeLimited { max_age_ms: max_age.as_millis() as u64 },
        }
    }

    pub fn ephemeral(name: &str, subjects: &[&str], max_age: Duration) -> Self {
        Self {
            name: name.to_string(),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            retention: Retention::Ephemeral { max_age_ms: max_age.as_millis() as u64 },
        }
    }
}

/// A message as seen by subscribers and work consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub stream: String,
    pub seq: u64,
    pub subject: String,
    pub payload: serde_json::Value,
    pub published_at_ms: u64,
}

#[derive(Debug, Error)]
pub enum BusError {
    /// Transport gone; callers must not queue behind this.
    #[error("bus unavailable")]
    Unavailable,
    #[error("no stream captures subject {0:?}")]
    UnknownSubject(String),
    #[error("unknown stream {0:?}")]
    UnknownStream(String),
    #[error("invalid subject {0:?}")]
    InvalidSubject(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable stream journal record. Publishes and acks interleave so a
/// replay reconstructs the outstanding set.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum JournalRecord {
    Publish(Message),
    Ack { ack: u64 },
}

struct Subscriber {
    pattern: String,
    tx: mpsc::Sender<Message>,
}

struct QueueConsumer {
    tx: mpsc::Sender<Message>,
}

struct Pending {
    message: Message,
    delivered_at_ms: u64,
}

struct StreamState {
    policy: StreamPolicy,
    next_seq: u64,
    /// Undelivered work messages (work-queue only).
    ready: VecDeque<Message>,
    /// Delivered, unacknowledged work messages keyed by seq.
    pending: HashMap<u64, Pending>,
    /// Retained messages (age-limited and ephemeral streams).
    retained: VecDeque<Message>,
    /// Work-queue consumers, round-robin.
    consumers: Vec<QueueConsumer>,
    rr_cursor: usize,
    journal: Option<File>,
}

impl StreamState {
    fn prune(&mut self, now_ms: u64) {
        let max_age_ms = match self.policy.retention {
            Retention::AgeLimited { max_age_ms } | Retention::Ephemeral { max_age_ms } => max_age_ms,
            Retention::WorkQueue => return,
        };
        while let Some(front) = self.retained.front() {
            if now_ms.saturating_sub(front.published_at_ms) > max_age_ms {
                self.retained.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Receiving half of a subscription.
pub struct Subscription {
    pub rx: mpsc::Receiver<Message>,
}

impl Subscription {
    /// Next message, `None` once the bus shuts down.
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Drain without waiting (used by tests and sweep-driven loops).
    pub fn try_next(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

/// Exclusive work-queue consumer handle. Each received message must be
/// acknowledged via [`Bus::ack`] or it is redelivered after the ack-wait.
pub struct WorkConsumer {
    pub rx: mpsc::Receiver<Message>,
}

impl WorkConsumer {
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

/// In-process broker with durable journals for non-ephemeral streams.
pub struct Bus<C: Clock> {
    clock: C,
    dir: Option<PathBuf>,
    ack_wait: Duration,
    closed: AtomicBool,
    inner: Mutex<BusInner>,
}

#[derive(Default)]
struct BusInner {
    streams: HashMap<String, StreamState>,
    subscribers: Vec<Subscriber>,
}

impl<C: Clock> Bus<C> {
    /// Create a broker. `dir` is the journal directory for durable
    /// streams; `None` keeps everything in memory (tests).
    pub fn new(dir: Option<PathBuf>, clock: C) -> Self {
        Self {
            clock,
            dir,
            ack_wait: DEFAULT_ACK_WAIT,
            closed: AtomicBool::new(false),
            inner: Mutex::new(BusInner::default()),
        }
    }

    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    /// Get a reference to the clock
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Idempotent stream declaration. Existing streams keep their
    /// messages; the policy is refreshed in place. Durable streams replay
    /// their journal to recover outstanding work.
    pub fn create_or_update_stream(&self, policy: StreamPolicy) -> Result<(), BusError> {
        self.ensure_open()?;
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.streams.get_mut(&policy.name) {
            existing.policy = policy;
            return Ok(());
        }

        let mut state = StreamState {
            next_seq: 0,
            ready: VecDeque::new(),
            pending: HashMap::new(),
            retained: VecDeque::new(),
            consumers: Vec::new(),
            rr_cursor: 0,
            journal: None,
            policy,
        };

        if state.policy.retention.is_durable() {
            if let Some(dir) = &self.dir {
                std::fs::create_dir_all(dir)?;
                let path = journal_path(dir, &state.policy.name);
                replay_journal(&path, &mut state)?;
                state.journal = Some(
                    OpenOptions::new().create(true).append(true).open(&path)?,
                );
            }
        }

        debug!(stream = %state.policy.name, "stream declared");
        inner.streams.insert(state.policy.name.clone(), state);
        Ok(())
    }

    /// Publish a payload. The subject picks the stream; per-subject FIFO
    /// holds for a single producer, nothing across subjects.
    pub fn publish(
        &self,
        subject: &str,
        payload: serde_json::Value,
    ) -> Result<u64, BusError> {
        self.ensure_open()?;
        if !subject::is_valid_subject(subject) {
            return Err(BusError::InvalidSubject(subject.to_string()));
        }
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();

        let stream_name = inner
            .streams
            .values()
            .find(|s| s.policy.subjects.iter().any(|p| subject::matches(p, subject)))
            .map(|s| s.policy.name.clone())
            .ok_or_else(|| BusError::UnknownSubject(subject.to_string()))?;

        let BusInner { streams, subscribers } = &mut *inner;
        let state = streams
            .get_mut(&stream_name)
            .ok_or_else(|| BusError::UnknownStream(stream_name.clone()))?;

        state.next_seq += 1;
        let message = Message {
            stream: stream_name,
            seq: state.next_seq,
            subject: subject.to_string(),
            payload,
            published_at_ms: now_ms,
        };

        if let Some(journal) = state.journal.as_mut() {
            append_record(journal, &JournalRecord::Publish(message.clone()))?;
        }

        match state.policy.retention {
            Retention::WorkQueue => {
                state.ready.push_back(message.clone());
                Self::drain_ready(state, now_ms);
            }
            Retention::AgeLimited { .. } | Retention::Ephemeral { .. } => {
                state.retained.push_back(message.clone());
                state.prune(now_ms);
                fan_out(subscribers, &message);
            }
        }

        Ok(message.seq)
    }

    /// Subscribe to subjects matching `pattern` across all streams.
    /// Durable streams deliver at-least-once from now; ephemeral streams
    /// are best-effort. Subscribers must be idempotent.
    pub fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        self.ensure_open()?;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.inner.lock().subscribers.push(Subscriber { pattern: pattern.to_string(), tx });
        Ok(Subscription { rx })
    }

    /// Join the work-queue consumer group of a stream. Messages are
    /// round-robined; each is in flight to exactly one consumer until
    /// acked or the ack-wait lapses.
    pub fn queue_subscribe(&self, stream: &str) -> Result<WorkConsumer, BusError> {
        self.ensure_open()?;
        let mut inner = self.inner.lock();
        let state = inner
            .streams
            .get_mut(stream)
            .ok_or_else(|| BusError::UnknownStream(stream.to_string()))?;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        state.consumers.push(QueueConsumer { tx });
        let now_ms = self.clock.epoch_ms();
        Self::drain_ready(state, now_ms);
        Ok(WorkConsumer { rx })
    }

    /// Acknowledge a work message; deletes it permanently.
    pub fn ack(&self, stream: &str, seq: u64) -> Result<(), BusError> {
        self.ensure_open()?;
        let mut inner = self.inner.lock();
        let state = inner
            .streams
            .get_mut(stream)
            .ok_or_else(|| BusError::UnknownStream(stream.to_string()))?;
        if state.pending.remove(&seq).is_none() {
            // Ack of an already-acked or never-delivered seq: idempotent drop.
            state.ready.retain(|m| m.seq != seq);
        }
        if let Some(journal) = state.journal.as_mut() {
            append_record(journal, &JournalRecord::Ack { ack: seq })?;
        }
        Ok(())
    }

    /// Periodic maintenance: redeliver expired pending work, prune
    /// retained messages past their age cap. Called from the engine's
    /// timer loop.
    pub fn sweep(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let now_ms = self.clock.epoch_ms();
        let ack_wait_ms = self.ack_wait.as_millis() as u64;
        let mut inner = self.inner.lock();
        for state in inner.streams.values_mut() {
            let expired: Vec<u64> = state
                .pending
                .iter()
                .filter(|(_, p)| now_ms.saturating_sub(p.delivered_at_ms) >= ack_wait_ms)
                .map(|(seq, _)| *seq)
                .collect();
            for seq in expired {
                if let Some(p) = state.pending.remove(&seq) {
                    debug!(stream = %state.policy.name, seq, "redelivering unacked message");
                    state.ready.push_back(p.message);
                }
            }
            Self::drain_ready(state, now_ms);
            state.prune(now_ms);
        }
    }

    /// Count of work messages neither delivered nor acked (tests, status).
    pub fn ready_len(&self, stream: &str) -> usize {
        self.inner.lock().streams.get(stream).map_or(0, |s| s.ready.len())
    }

    /// Count of delivered-but-unacked work messages.
    pub fn pending_len(&self, stream: &str) -> usize {
        self.inner.lock().streams.get(stream).map_or(0, |s| s.pending.len())
    }

    /// Stop accepting publishes; subscribers see channel close.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let mut inner = self.inner.lock();
        inner.subscribers.clear();
        for state in inner.streams.values_mut() {
            state.consumers.clear();
        }
    }

    pub fn is_available(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BusError::Unavailable)
        } else {
            Ok(())
        }
    }

    /// Push ready work messages to consumers, round-robin. A consumer
    /// with a full channel is skipped; the message stays ready.
    fn drain_ready(state: &mut StreamState, now_ms: u64) {
        if state.consumers.is_empty() {
            return;
        }
        state.consumers.retain(|c| !c.tx.is_closed());
        if state.consumers.is_empty() {
            return;
        }
        let mut remaining = VecDeque::new();
        while let Some(message) = state.ready.pop_front() {
            let n = state.consumers.len();
            let mut delivered = false;
            for offset in 0..n {
                let idx = (state.rr_cursor + offset) % n;
                if state.consumers[idx].tx.try_send(message.clone()).is_ok() {
                    state.rr_cursor = (idx + 1) % n;
                    state.pending.insert(
                        message.seq,
                        Pending { message: message.clone(), delivered_at_ms: now_ms },
                    );
                    delivered = true;
                    break;
                }
            }
            if !delivered {
                remaining.push_back(message);
            }
        }
        state.ready = remaining;
    }
}

fn fan_out(subscribers: &mut Vec<Subscriber>, message: &Message) {
    subscribers.retain(|s| !s.tx.is_closed());
    for sub in subscribers.iter() {
        if subject::matches(&sub.pattern, &message.subject) {
            // Best-effort: a full subscriber drops the message rather
            // than blocking the publisher.
            if sub.tx.try_send(message.clone()).is_err() {
                warn!(subject = %message.subject, "subscriber full, dropping message");
            }
        }
    }
}

fn journal_path(dir: &Path, stream: &str) -> PathBuf {
    dir.join(format!("{stream}.jsonl"))
}

fn append_record(file: &mut File, record: &JournalRecord) -> Result<(), BusError> {
    let mut bytes = serde_json::to_vec(record)?;
    bytes.push(b'\n');
    file.write_all(&bytes)?;
    Ok(())
}

/// Rebuild a stream's outstanding messages from its journal. Acked seqs
/// are dropped; the rest become ready for (re)delivery. Corrupt tail
/// lines end the replay with a warning.
fn replay_journal(path: &Path, state: &mut StreamState) -> Result<(), BusError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let mut outstanding: HashMap<u64, Message> = HashMap::new();
    let mut order: Vec<u64> = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalRecord>(trimmed) {
            Ok(JournalRecord::Publish(message)) => {
                state.next_seq = state.next_seq.max(message.seq);
                order.push(message.seq);
                outstanding.insert(message.seq, message);
            }
            Ok(JournalRecord::Ack { ack }) => {
                outstanding.remove(&ack);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt journal line, stopping replay");
                break;
            }
        }
    }
    if matches!(state.policy.retention, Retention::WorkQueue) {
        for seq in order {
            if let Some(message) = outstanding.remove(&seq) {
                state.ready.push_back(message);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
