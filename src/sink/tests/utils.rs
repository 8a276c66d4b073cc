//! Recording collaborators for sink tests

use crate::acknowledgement::{AcknowledgementOrdering, AcknowledgementProcessor};
use crate::backpressure::{BackPressureHandler, ReleaseReason};
use crate::listener::{
    BatchMessageListener, ErrorHandler, Listener, ListenerError, ListenerResult, MessageListener,
};
use crate::queue::Message;
use crate::sink::MessageProcessingContext;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
pub struct RecordingAcknowledgement {
    pub acknowledged: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl AcknowledgementProcessor for RecordingAcknowledgement {
    async fn on_acknowledge(&self, messages: Vec<Arc<Message>>) {
        let mut acknowledged = self.acknowledged.lock().unwrap();
        acknowledged.extend(messages.iter().map(|m| m.id().to_string()));
    }

    fn start(&self) {}

    async fn stop(&self) -> bool {
        true
    }

    fn ordering(&self) -> AcknowledgementOrdering {
        AcknowledgementOrdering::Parallel
    }
}

#[derive(Default)]
pub struct RecordingBackPressure {
    pub processed: AtomicUsize,
}

#[async_trait::async_trait]
impl BackPressureHandler for RecordingBackPressure {
    async fn request(&self, amount: usize) -> usize {
        amount
    }

    fn release(&self, amount: usize, reason: ReleaseReason) {
        if reason == ReleaseReason::Processed {
            self.processed.fetch_add(amount, Ordering::SeqCst);
        }
    }

    async fn drain(&self, _timeout: Duration) -> bool {
        true
    }
}

#[derive(Default)]
pub struct RecordingErrors {
    pub failed: Mutex<Vec<String>>,
}

impl ErrorHandler for RecordingErrors {
    fn handle(&self, messages: &[Arc<Message>], _error: &ListenerError) {
        let mut failed = self.failed.lock().unwrap();
        failed.extend(messages.iter().map(|m| m.id().to_string()));
    }
}

/// One listener invocation: message id with start and end times
#[derive(Debug, Clone)]
pub struct Span {
    pub id: String,
    pub group: Option<String>,
    pub start: Instant,
    pub end: Instant,
}

/// Sleeps for the duration encoded in the body (milliseconds) and records spans
///
/// Bodies starting with `fail` produce an error, `panic` a panic.
#[derive(Default)]
pub struct TimedListener {
    pub spans: Mutex<Vec<Span>>,
}

impl TimedListener {
    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().unwrap().clone()
    }

    async fn handle(&self, message: &Message) -> ListenerResult<()> {
        let start = Instant::now();
        if message.data.starts_with("panic") {
            panic!("listener panic for {}", message.id());
        }
        let millis = message
            .data
            .trim_start_matches("fail")
            .parse::<u64>()
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        self.spans.lock().unwrap().push(Span {
            id: message.id().to_string(),
            group: message.group_id().map(str::to_string),
            start,
            end: Instant::now(),
        });
        if message.data.starts_with("fail") {
            return Err(ListenerError::failed(format!("{} failed", message.id())));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageListener for TimedListener {
    async fn on_message(&self, message: Arc<Message>) -> ListenerResult<()> {
        self.handle(&message).await
    }
}

/// Batch listener over the same timing rules; fails the batch if any message fails
#[derive(Default)]
pub struct TimedBatchListener {
    pub inner: TimedListener,
    pub batches: Mutex<Vec<usize>>,
}

#[async_trait::async_trait]
impl BatchMessageListener for TimedBatchListener {
    async fn on_messages(&self, messages: Vec<Arc<Message>>) -> ListenerResult<()> {
        self.batches.lock().unwrap().push(messages.len());
        let mut result = Ok(());
        for message in &messages {
            if let Err(e) = self.inner.handle(message).await {
                result = Err(e);
            }
        }
        result
    }
}

pub struct Harness {
    pub acknowledgement: Arc<RecordingAcknowledgement>,
    pub back_pressure: Arc<RecordingBackPressure>,
    pub errors: Arc<RecordingErrors>,
    pub context: MessageProcessingContext,
}

impl Harness {
    pub fn new(listener: Listener) -> Self {
        let acknowledgement = Arc::new(RecordingAcknowledgement::default());
        let back_pressure = Arc::new(RecordingBackPressure::default());
        let errors = Arc::new(RecordingErrors::default());
        let context = MessageProcessingContext::new(
            listener,
            acknowledgement.clone(),
            errors.clone(),
            back_pressure.clone(),
        );
        Self {
            acknowledgement,
            back_pressure,
            errors,
            context,
        }
    }

    pub fn acknowledged(&self) -> Vec<String> {
        let mut acknowledged = self.acknowledgement.acknowledged.lock().unwrap().clone();
        acknowledged.sort();
        acknowledged
    }

    pub fn failed(&self) -> Vec<String> {
        let mut failed = self.errors.failed.lock().unwrap().clone();
        failed.sort();
        failed
    }

    pub fn processed_permits(&self) -> usize {
        self.back_pressure.processed.load(Ordering::SeqCst)
    }
}

/// Message `m<index>` whose body is `body`
pub fn message(index: usize, body: &str) -> Arc<Message> {
    Arc::new(Message::new(
        format!("m{}", index),
        format!("r{}", index),
        body.to_string(),
    ))
}

pub fn grouped(index: usize, group: &str, body: &str) -> Arc<Message> {
    Arc::new(
        Message::new(format!("m{}", index), format!("r{}", index), body.to_string())
            .with_group_id(group),
    )
}
