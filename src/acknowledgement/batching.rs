//! Buffered acknowledgement with size and age triggers

use crate::acknowledgement::{
    AcknowledgementExecutor, AcknowledgementOrdering, AcknowledgementProcessor,
};
use crate::queue::Message;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

type PendingBuffers = HashMap<String, VecDeque<(Instant, Arc<Message>)>>;

/// Buffers acknowledgements and commits them in groups
///
/// A buffer is kept per ordering key. A key's buffer is flushed in chunks of
/// `ack_threshold` as soon as it holds that many messages, and every buffer
/// is flushed once `ack_interval` has passed since the oldest pending
/// message arrived.
///
/// The buffering task only runs between [`start`](AcknowledgementProcessor::start)
/// and [`stop`](AcknowledgementProcessor::stop); outside that window
/// acknowledgements are committed straight away so none are lost.
pub struct BatchingAcknowledgementProcessor {
    id: String,
    executor: Arc<AcknowledgementExecutor>,
    ack_threshold: usize,
    ack_interval: Duration,
    shutdown_timeout: Duration,
    sender: Mutex<Option<mpsc::UnboundedSender<Vec<Arc<Message>>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BatchingAcknowledgementProcessor {
    pub fn new(
        executor: AcknowledgementExecutor,
        ack_threshold: usize,
        ack_interval: Duration,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            id: "acknowledgement".to_string(),
            executor: Arc::new(executor),
            ack_threshold: ack_threshold.max(1),
            ack_interval,
            shutdown_timeout,
            sender: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_running(&self) -> bool {
        self.sender_guard().is_some()
    }

    fn sender_guard(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Vec<Arc<Message>>>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl AcknowledgementProcessor for BatchingAcknowledgementProcessor {
    async fn on_acknowledge(&self, messages: Vec<Arc<Message>>) {
        if messages.is_empty() {
            return;
        }
        let sent = match self.sender_guard().as_ref() {
            Some(sender) => sender.send(messages).map_err(|e| e.0),
            None => Err(messages),
        };
        if let Err(messages) = sent {
            log::debug!(
                "[{}] Not buffering, committing {} messages immediately",
                self.id,
                messages.len()
            );
            self.executor.acknowledge(messages).await;
        }
    }

    fn start(&self) {
        let mut sender = self.sender_guard();
        if sender.is_some() {
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *sender = Some(tx);

        let worker = BatchingWorker {
            id: self.id.clone(),
            executor: self.executor.clone(),
            ack_threshold: self.ack_threshold,
            ack_interval: self.ack_interval,
            buffers: HashMap::new(),
            commits: JoinSet::new(),
        };
        let handle = tokio::spawn(worker.run(rx));
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        log::debug!(
            "[{}] Batching acknowledgements (threshold {}, interval {:?}, {})",
            self.id,
            self.ack_threshold,
            self.ack_interval,
            self.executor.ordering()
        );
    }

    async fn stop(&self) -> bool {
        // Closing the channel tells the worker to flush and finish
        drop(self.sender_guard().take());
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return true;
        };

        match tokio::time::timeout(self.shutdown_timeout, worker).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::error!("[{}] Acknowledgement task failed: {}", self.id, e);
                false
            }
            Err(_) => {
                log::warn!(
                    "[{}] Pending acknowledgements not finished within {:?}",
                    self.id,
                    self.shutdown_timeout
                );
                false
            }
        }
    }

    fn ordering(&self) -> AcknowledgementOrdering {
        self.executor.ordering()
    }
}

struct BatchingWorker {
    id: String,
    executor: Arc<AcknowledgementExecutor>,
    ack_threshold: usize,
    ack_interval: Duration,
    buffers: PendingBuffers,
    commits: JoinSet<()>,
}

impl BatchingWorker {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Vec<Arc<Message>>>) {
        loop {
            let deadline = self.oldest_pending().map(|oldest| oldest + self.ack_interval);
            tokio::select! {
                received = receiver.recv() => match received {
                    Some(messages) => {
                        self.buffer(messages);
                        self.flush_full();
                    }
                    None => break,
                },
                _ = sleep_until(deadline) => {
                    log::trace!("[{}] Acknowledgement interval elapsed", self.id);
                    self.flush_all();
                }
                Some(joined) = self.commits.join_next(), if !self.commits.is_empty() => {
                    if let Err(e) = joined {
                        log::error!("[{}] Commit task failed: {}", self.id, e);
                    }
                }
            }
        }

        self.flush_all();
        while let Some(joined) = self.commits.join_next().await {
            if let Err(e) = joined {
                log::error!("[{}] Commit task failed: {}", self.id, e);
            }
        }
        log::debug!("[{}] Acknowledgement buffer flushed", self.id);
    }

    fn buffer(&mut self, messages: Vec<Arc<Message>>) {
        let now = Instant::now();
        for message in messages {
            let key = self.executor.ordering_key(&message);
            self.buffers
                .entry(key)
                .or_default()
                .push_back((now, message));
        }
    }

    fn oldest_pending(&self) -> Option<Instant> {
        self.buffers
            .values()
            .filter_map(|buffer| buffer.front().map(|(arrived, _)| *arrived))
            .min()
    }

    fn flush_full(&mut self) {
        let mut chunks = Vec::new();
        for buffer in self.buffers.values_mut() {
            while buffer.len() >= self.ack_threshold {
                chunks.push(take(buffer, self.ack_threshold));
            }
        }
        self.buffers.retain(|_, buffer| !buffer.is_empty());
        for chunk in chunks {
            self.spawn_commit(chunk);
        }
    }

    fn flush_all(&mut self) {
        let buffers = std::mem::take(&mut self.buffers);
        for (_, mut buffer) in buffers {
            let len = buffer.len();
            if len > 0 {
                self.spawn_commit(take(&mut buffer, len));
            }
        }
    }

    fn spawn_commit(&mut self, messages: Vec<Arc<Message>>) {
        log::trace!("[{}] Flushing {} acknowledgements", self.id, messages.len());
        // Scheduling here, in arrival order, fixes the commit order
        for unit in self.executor.schedule(messages) {
            let executor = self.executor.clone();
            self.commits
                .spawn(async move { executor.execute(unit).await });
        }
    }
}

fn take(buffer: &mut VecDeque<(Instant, Arc<Message>)>, count: usize) -> Vec<Arc<Message>> {
    buffer.drain(..count).map(|(_, message)| message).collect()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
