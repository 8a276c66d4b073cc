//! Per-key sequencing of asynchronous work
//!
//! A [`GroupSequencer`] hands out [`SequenceSlot`]s in call order. A slot's
//! `wait_turn` resolves once every earlier slot for the same key has been
//! dropped, so work done between `wait_turn` and drop runs strictly in
//! enqueue order per key while different keys proceed independently.
//!
//! The order is fixed when `enqueue` is called, not when the slot is first
//! polled, which lets a single producer fix the order synchronously and then
//! hand the slots to spawned tasks.
//!
//! A key's entry is removed as soon as its most recent slot is dropped, so
//! the map only ever holds keys with outstanding work.

use futures::future::{FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

type Completion = Shared<oneshot::Receiver<()>>;

struct Tail {
    ticket: u64,
    done: Completion,
}

/// Orders work per key in enqueue order
pub struct GroupSequencer {
    tails: Mutex<HashMap<String, Tail>>,
    next_ticket: AtomicU64,
}

impl GroupSequencer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tails: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
        })
    }

    /// Reserve the next position for `key`
    pub fn enqueue(self: &Arc<Self>, key: &str) -> SequenceSlot {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();

        let previous = self
            .tails
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_string(),
                Tail {
                    ticket,
                    done: done_rx.shared(),
                },
            )
            .map(|tail| tail.done);

        SequenceSlot {
            sequencer: Arc::clone(self),
            key: key.to_string(),
            ticket,
            previous,
            done: Some(done_tx),
        }
    }

    /// Number of keys that currently have outstanding slots
    pub fn active_keys(&self) -> usize {
        self.tails
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, key: &str, ticket: u64) {
        let mut tails = self.tails.lock().unwrap_or_else(PoisonError::into_inner);
        if tails.get(key).is_some_and(|tail| tail.ticket == ticket) {
            tails.remove(key);
        }
    }
}

/// A reserved position in a key's sequence; dropping it lets the next one run
pub struct SequenceSlot {
    sequencer: Arc<GroupSequencer>,
    key: String,
    ticket: u64,
    previous: Option<Completion>,
    done: Option<oneshot::Sender<()>>,
}

impl SequenceSlot {
    /// Wait until every earlier slot for this key has been dropped
    pub async fn wait_turn(&mut self) {
        if let Some(previous) = self.previous.take() {
            // A dropped sender is also a completed turn
            let _ = previous.await;
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for SequenceSlot {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        self.sequencer.release(&self.key, self.ticket);
    }
}
