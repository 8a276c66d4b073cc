//! Common test utilities and helpers
//!
//! Provides a timing listener, fast container options and a polling wait used
//! by the container integration tests.

use queue_listener::core::retry::BackOffPolicy;
use queue_listener::listener::{
    ContainerOptions, Listener, ListenerContainer, ListenerError, ListenerResult, MessageListener,
};
use queue_listener::queue::{InMemoryQueue, Message, QueueClient};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// One listener invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub id: String,
    pub group: Option<String>,
    pub sequence: u64,
    pub start: Instant,
    pub end: Instant,
}

/// Sleeps for the number of milliseconds in the message body and records it
///
/// Bodies prefixed with `fail` are rejected after sleeping.
#[derive(Default)]
pub struct TimingListener {
    invocations: Mutex<Vec<Invocation>>,
}

impl TimingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn handled_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.invocations().into_iter().map(|i| i.id).collect();
        ids.sort();
        ids
    }
}

#[async_trait::async_trait]
impl MessageListener for TimingListener {
    async fn on_message(&self, message: Arc<Message>) -> ListenerResult<()> {
        let start = Instant::now();
        let millis = message
            .data
            .trim_start_matches("fail")
            .parse::<u64>()
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        self.invocations.lock().unwrap().push(Invocation {
            id: message.id().to_string(),
            group: message.group_id().map(str::to_string),
            sequence: message.header.sequence,
            start,
            end: Instant::now(),
        });
        if message.data.starts_with("fail") {
            return Err(ListenerError::failed(format!("{} rejected", message.id())));
        }
        Ok(())
    }
}

/// Options with short poll and acknowledgement timings
pub fn fast_options() -> ContainerOptions {
    ContainerOptions::new()
        .with_poll_timeout(Duration::from_millis(20))
        .with_acquire_timeout(Duration::from_millis(50))
        .with_no_permits_returned_wait_timeout(Duration::from_millis(50))
        .with_ack_interval(Duration::from_millis(20))
        .with_listener_shutdown_timeout(Duration::from_secs(5))
        .with_poll_back_off(BackOffPolicy {
            initial_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(50),
        })
}

pub fn build_container(
    id: &str,
    queue: &Arc<InMemoryQueue>,
    listener: Arc<TimingListener>,
    options: ContainerOptions,
) -> Arc<ListenerContainer> {
    let client: Arc<dyn QueueClient> = queue.clone();
    ListenerContainer::builder(id, client, Listener::Single(listener))
        .options(options)
        .build()
        .unwrap()
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
