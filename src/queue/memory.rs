//! In-process queue broker implementing [`QueueClient`]
//!
//! Behaves like a hosted queue closely enough to exercise the listener core:
//! - Sequence-numbered messages delivered oldest first
//! - Visibility timeouts; uncommitted messages reappear once their lease expires
//! - A fresh receipt handle per receive; stale handles are rejected, while
//!   committing an already committed handle again succeeds
//! - FIFO mode: a group with a message in flight is not delivered from until
//!   that message is committed or its lease expires
//! - Long polling via `fetch`'s wait time
//! - Fault injection for fetch and commit calls

use crate::queue::client::QueueClient;
use crate::queue::error::{ClientError, ClientResult};
use crate::queue::message::{Message, MessageHeader};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Notify;

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_SIZE: usize = 100_000;
// Upper bound on one long-poll sleep so expiring leases are noticed
const LONG_POLL_RECHECK: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    sequence: u64,
    group_id: Option<String>,
    data: String,
    sent_timestamp: SystemTime,
    receive_count: u32,
    receipt_handle: Option<String>,
    visible_at: Instant,
}

impl StoredMessage {
    fn is_in_flight(&self, now: Instant) -> bool {
        self.receipt_handle.is_some() && self.visible_at > now
    }
}

#[derive(Debug, Default)]
struct QueueState {
    next_sequence: u64,
    next_receipt: u64,
    messages: VecDeque<StoredMessage>,
    committed_receipts: HashSet<String>,
    stats: QueueStats,
}

/// Counters describing the broker's activity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub sent: u64,
    pub received: u64,
    pub redelivered: u64,
    pub committed: u64,
    pub lease_extensions: u64,
}

/// In-memory queue with lease semantics
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    fifo: bool,
    max_size: usize,
    visibility_timeout: Duration,
    state: Mutex<QueueState>,
    message_available: Notify,
    failing_fetches: AtomicUsize,
    failing_commits: AtomicBool,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fifo: false,
            max_size: DEFAULT_MAX_SIZE,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            state: Mutex::new(QueueState {
                next_sequence: 1,
                ..QueueState::default()
            }),
            message_available: Notify::new(),
            failing_fetches: AtomicUsize::new(0),
            failing_commits: AtomicBool::new(false),
        }
    }

    /// FIFO queue; messages of a group are handed out one lease at a time
    pub fn fifo(name: impl Into<String>) -> Self {
        Self {
            fifo: true,
            ..Self::new(name)
        }
    }

    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn is_fifo(&self) -> bool {
        self.fifo
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a message, returning its sequence number
    pub fn send(&self, data: impl Into<String>, group_id: Option<&str>) -> ClientResult<u64> {
        let sequence = {
            let mut state = self.lock();
            if state.messages.len() >= self.max_size {
                return Err(ClientError::QueueFull {
                    max_size: self.max_size,
                });
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.stats.sent += 1;
            state.messages.push_back(StoredMessage {
                message_id: format!("{}-{}", self.name, sequence),
                sequence,
                group_id: group_id.map(str::to_string),
                data: data.into(),
                sent_timestamp: SystemTime::now(),
                receive_count: 0,
                receipt_handle: None,
                visible_at: Instant::now(),
            });
            sequence
        };
        self.message_available.notify_waiters();
        Ok(sequence)
    }

    /// Messages not yet committed, visible or not
    pub fn size(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Messages currently leased to a consumer
    pub fn in_flight_count(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .messages
            .iter()
            .filter(|message| message.is_in_flight(now))
            .count()
    }

    pub fn stats(&self) -> QueueStats {
        self.lock().stats.clone()
    }

    /// Make the next `count` fetches fail
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Make every commit fail until switched off again
    pub fn set_failing_commits(&self, failing: bool) {
        self.failing_commits.store(failing, Ordering::SeqCst);
    }

    fn try_receive(&self, max_messages: usize) -> Vec<Message> {
        let now = Instant::now();
        let mut state = self.lock();

        let blocked_groups: HashSet<String> = if self.fifo {
            state
                .messages
                .iter()
                .filter(|message| message.is_in_flight(now))
                .filter_map(|message| message.group_id.clone())
                .collect()
        } else {
            HashSet::new()
        };

        let mut received = Vec::new();
        let mut skipped_groups = HashSet::new();
        let mut receipts = state.next_receipt;
        let mut redelivered = 0;

        for stored in state.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            if self.fifo {
                if let Some(group) = &stored.group_id {
                    if blocked_groups.contains(group) || skipped_groups.contains(group) {
                        continue;
                    }
                }
            }
            if stored.visible_at > now {
                // Keep later messages of a leased group behind it
                if let Some(group) = &stored.group_id {
                    skipped_groups.insert(group.clone());
                }
                continue;
            }

            receipts += 1;
            if stored.receive_count > 0 {
                redelivered += 1;
            }
            stored.receive_count += 1;
            stored.visible_at = now + self.visibility_timeout;
            let receipt_handle = format!("{}#{}", stored.message_id, receipts);
            stored.receipt_handle = Some(receipt_handle.clone());

            received.push(Message {
                header: MessageHeader {
                    message_id: stored.message_id.clone(),
                    receipt_handle,
                    group_id: stored.group_id.clone(),
                    sequence: stored.sequence,
                    receive_count: stored.receive_count,
                    sent_timestamp: stored.sent_timestamp,
                    queue: self.name.clone(),
                },
                data: stored.data.clone(),
            });
        }

        state.next_receipt = receipts;
        state.stats.received += received.len() as u64;
        state.stats.redelivered += redelivered;
        received
    }

    fn find_by_receipt<'a>(
        state: &'a mut QueueState,
        receipt_handle: &str,
    ) -> Option<(usize, &'a mut StoredMessage)> {
        state
            .messages
            .iter_mut()
            .enumerate()
            .find(|(_, message)| message.receipt_handle.as_deref() == Some(receipt_handle))
    }
}

#[async_trait::async_trait]
impl QueueClient for InMemoryQueue {
    fn queue_name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, max_messages: usize, wait_time: Duration) -> ClientResult<Vec<Message>> {
        let failing = self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(ClientError::Fetch {
                queue: self.name.clone(),
                message: "injected fetch failure".to_string(),
            });
        }

        let deadline = tokio::time::Instant::now() + wait_time;
        loop {
            let notified = self.message_available.notified();
            let received = self.try_receive(max_messages);
            let now = tokio::time::Instant::now();
            if !received.is_empty() || max_messages == 0 || now >= deadline {
                return Ok(received);
            }
            let recheck = (deadline - now).min(LONG_POLL_RECHECK);
            let _ = tokio::time::timeout(recheck, notified).await;
        }
    }

    async fn commit(&self, receipt_handle: &str) -> ClientResult<()> {
        if self.failing_commits.load(Ordering::SeqCst) {
            return Err(ClientError::Commit {
                receipt_handle: receipt_handle.to_string(),
                message: "injected commit failure".to_string(),
            });
        }

        {
            let mut state = self.lock();
            if state.committed_receipts.contains(receipt_handle) {
                return Ok(());
            }
            let index = Self::find_by_receipt(&mut state, receipt_handle)
                .map(|(index, _)| index)
                .ok_or_else(|| ClientError::UnknownReceiptHandle {
                    receipt_handle: receipt_handle.to_string(),
                })?;
            state.messages.remove(index);
            state.committed_receipts.insert(receipt_handle.to_string());
            state.stats.committed += 1;
        }
        // A FIFO group may have become deliverable
        self.message_available.notify_waiters();
        Ok(())
    }

    async fn extend_lease(&self, receipt_handle: &str, duration: Duration) -> ClientResult<()> {
        let mut state = self.lock();
        let now = Instant::now();
        let (_, stored) = Self::find_by_receipt(&mut state, receipt_handle).ok_or_else(|| {
            ClientError::UnknownReceiptHandle {
                receipt_handle: receipt_handle.to_string(),
            }
        })?;
        if stored.visible_at <= now {
            return Err(ClientError::ExtendLease {
                receipt_handle: receipt_handle.to_string(),
                message: "lease already expired".to_string(),
            });
        }
        stored.visible_at = now + duration;
        state.stats.lease_extensions += 1;
        Ok(())
    }
}
