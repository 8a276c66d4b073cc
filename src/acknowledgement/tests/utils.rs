//! Recording client and callback shared by the acknowledgement tests

use crate::acknowledgement::{AcknowledgementError, AcknowledgementResultCallback};
use crate::queue::{ClientError, ClientResult, Message, QueueClient};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Queue client that records the order of successful commits
#[derive(Default)]
pub struct RecordingClient {
    committed: Mutex<Vec<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
    attempts: AtomicUsize,
}

impl RecordingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delay_commit(&self, receipt_handle: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(receipt_handle.to_string(), delay);
    }

    pub fn fail_commit(&self, receipt_handle: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(receipt_handle.to_string());
    }

    pub fn committed(&self) -> Vec<String> {
        self.committed.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl QueueClient for RecordingClient {
    fn queue_name(&self) -> &str {
        "recording"
    }

    async fn fetch(&self, _max_messages: usize, _wait_time: Duration) -> ClientResult<Vec<Message>> {
        Ok(Vec::new())
    }

    async fn commit(&self, receipt_handle: &str) -> ClientResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(receipt_handle).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(receipt_handle) {
            return Err(ClientError::Commit {
                receipt_handle: receipt_handle.to_string(),
                message: "rejected".to_string(),
            });
        }
        self.committed
            .lock()
            .unwrap()
            .push(receipt_handle.to_string());
        Ok(())
    }

    async fn extend_lease(&self, _receipt_handle: &str, _duration: Duration) -> ClientResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingCallback {
    pub successes: Mutex<Vec<Vec<String>>>,
    pub failures: Mutex<Vec<Vec<String>>>,
}

impl AcknowledgementResultCallback for RecordingCallback {
    fn on_success(&self, messages: &[Arc<Message>]) {
        self.successes.lock().unwrap().push(ids(messages));
    }

    fn on_failure(&self, messages: &[Arc<Message>], _error: &AcknowledgementError) {
        self.failures.lock().unwrap().push(ids(messages));
    }
}

fn ids(messages: &[Arc<Message>]) -> Vec<String> {
    messages.iter().map(|m| m.id().to_string()).collect()
}

/// Message `m<i>` with receipt handle `r<i>`
pub fn message(index: usize) -> Arc<Message> {
    Arc::new(Message::new(
        format!("m{}", index),
        format!("r{}", index),
        format!("body {}", index),
    ))
}

pub fn grouped_message(index: usize, group: &str) -> Arc<Message> {
    Arc::new(
        Message::new(
            format!("m{}", index),
            format!("r{}", index),
            format!("body {}", index),
        )
        .with_group_id(group),
    )
}
