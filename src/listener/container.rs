//! A listener container: one poll loop feeding one listener
//!
//! # Lifecycle
//!
//! ```text
//! CREATED --start--> RUNNING --stop--> STOPPING --> STOPPED
//! ```
//!
//! While running, the poll loop repeats:
//!
//! 1. request a batch of permits (the loop's only intended wait)
//! 2. fetch at most that many messages
//! 3. hand back the unused permits (`NONE_FETCHED` or `PARTIAL_FETCH`)
//! 4. spawn the sink's `emit` for the batch, which releases one `PROCESSED`
//!    permit per message once it has been handled and acknowledged
//!
//! Fetch failures put the loop into exponential back-off until a fetch
//! succeeds again.

use crate::acknowledgement::{
    AcknowledgementProcessor, AcknowledgementResultCallback, LoggingAcknowledgementCallback,
};
use crate::backpressure::{
    BackPressureHandler, BatchAwareBackPressureHandler, CompositeBackPressureHandler,
    ReleaseReason,
};
use crate::core::retry::BackOff;
use crate::listener::error::{ContainerError, ContainerResult};
use crate::listener::factory::{
    component_factory, create_back_pressure_handler, ContainerComponentFactory,
};
use crate::listener::handler::{ErrorHandler, Listener, LoggingErrorHandler};
use crate::listener::options::{ContainerOptions, ListenerMode};
use crate::queue::{Message, QueueClient};
use crate::sink::{MessageProcessingContext, MessageSink};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// Counts spawned batch dispatches so shutdown can wait for them
#[derive(Default)]
struct InFlightBatches {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard(Arc<InFlightBatches>);

impl InFlightBatches {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard(self.clone())
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.count() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, idle).await.is_err() {
                return self.count() == 0;
            }
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Polls one queue and dispatches to one listener
pub struct ListenerContainer {
    id: String,
    options: ContainerOptions,
    client: Arc<dyn QueueClient>,
    back_pressure: Arc<CompositeBackPressureHandler>,
    sink: Arc<dyn MessageSink>,
    acknowledgement: Arc<dyn AcknowledgementProcessor>,
    context: MessageProcessingContext,
    state: Mutex<ContainerState>,
    stop_signal: watch::Sender<bool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    in_flight: Arc<InFlightBatches>,
}

impl ListenerContainer {
    pub fn builder(
        id: impl Into<String>,
        client: Arc<dyn QueueClient>,
        listener: Listener,
    ) -> ListenerContainerBuilder {
        ListenerContainerBuilder {
            id: id.into(),
            client,
            listener,
            options: ContainerOptions::default(),
            error_handler: Arc::new(LoggingErrorHandler),
            acknowledgement_callback: Arc::new(LoggingAcknowledgementCallback),
            back_pressure: None,
            component_factory: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn queue_name(&self) -> &str {
        self.client.queue_name()
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    pub fn state(&self) -> ContainerState {
        *self.lock_state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ContainerState::Running
    }

    /// Batches currently being dispatched
    pub fn in_flight_batches(&self) -> usize {
        self.in_flight.count()
    }

    fn lock_state(&self) -> MutexGuard<'_, ContainerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start polling. Must be called within a tokio runtime.
    ///
    /// Starting a running container is a no-op; a stopped one cannot be
    /// started again.
    pub fn start(self: &Arc<Self>) -> ContainerResult<()> {
        {
            let mut state = self.lock_state();
            match *state {
                ContainerState::Created => *state = ContainerState::Running,
                ContainerState::Running => return Ok(()),
                other => {
                    return Err(ContainerError::InvalidState {
                        id: self.id.clone(),
                        operation: "start".to_string(),
                        state: other.to_string(),
                    })
                }
            }
        }

        self.acknowledgement.start();
        let container = self.clone();
        let handle = tokio::spawn(async move { container.poll_loop().await });
        *self
            .poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        log::info!(
            "[{}] Started listening on {} (batch size {}, {} permits, {}, {})",
            self.id,
            self.client.queue_name(),
            self.options.batch_size,
            self.options.total_permits,
            self.options.back_pressure_mode,
            if self.options.fifo { "FIFO" } else { "standard" }
        );
        Ok(())
    }

    /// Stop with the configured listener shutdown timeout
    pub async fn stop(&self) -> bool {
        self.stop_with_timeout(self.options.listener_shutdown_timeout)
            .await
    }

    /// Stop polling and wait up to `timeout` for in-flight messages
    ///
    /// Returns whether every in-flight message finished and every pending
    /// acknowledgement was sent in time. Work still running when the timeout
    /// passes is not cancelled; its acknowledgements are committed directly
    /// when it completes.
    pub async fn stop_with_timeout(&self, timeout: Duration) -> bool {
        {
            let mut state = self.lock_state();
            match *state {
                ContainerState::Running => *state = ContainerState::Stopping,
                ContainerState::Created => {
                    *state = ContainerState::Stopped;
                    return true;
                }
                ContainerState::Stopping | ContainerState::Stopped => return true,
            }
        }
        log::info!("[{}] Stopping, waiting up to {:?}", self.id, timeout);
        let deadline = Instant::now() + timeout;

        self.stop_signal.send_replace(true);
        let poll_task = self
            .poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(poll_task) = poll_task {
            if let Err(e) = poll_task.await {
                log::error!("[{}] Poll loop failed: {}", self.id, e);
            }
        }

        let drained = self
            .back_pressure
            .drain(deadline.saturating_duration_since(Instant::now()))
            .await;
        let idle = self
            .in_flight
            .wait_idle(deadline.saturating_duration_since(Instant::now()))
            .await;
        let acknowledged = self.acknowledgement.stop().await;

        *self.lock_state() = ContainerState::Stopped;
        let clean = drained && idle && acknowledged;
        if clean {
            log::info!("[{}] Stopped", self.id);
        } else {
            log::warn!(
                "[{}] Stopped with work outstanding ({} batches in flight)",
                self.id,
                self.in_flight.count()
            );
        }
        clean
    }

    async fn poll_loop(self: Arc<Self>) {
        let mut stop = self.stop_signal.subscribe();
        let mut back_off: Option<BackOff> = None;

        loop {
            if *stop.borrow() {
                break;
            }

            if let Some(back_off) = back_off.as_mut() {
                tokio::select! {
                    _ = back_off.back_off() => {}
                    _ = stop.changed() => break,
                }
            }

            // Permits are taken and returned within a single poll of `request`,
            // so abandoning it on stop leaks nothing
            let permits = tokio::select! {
                permits = self.back_pressure.request_batch() => permits,
                _ = stop.changed() => break,
            };
            if permits == 0 {
                continue;
            }
            if *stop.borrow() {
                self.back_pressure.release(permits, ReleaseReason::NoneFetched);
                break;
            }

            let fetched = tokio::select! {
                fetched = self.client.fetch(permits, self.options.poll_timeout) => fetched,
                _ = stop.changed() => {
                    self.back_pressure.release(permits, ReleaseReason::NoneFetched);
                    break;
                }
            };

            match fetched {
                Ok(messages) => {
                    back_off = None;
                    self.dispatch(permits, messages);
                }
                Err(e) => {
                    log::warn!("[{}] Fetch failed: {}", self.id, e);
                    self.back_pressure.release(permits, ReleaseReason::NoneFetched);
                    back_off.get_or_insert_with(|| self.options.poll_back_off.start());
                }
            }
        }
        log::debug!("[{}] Poll loop finished", self.id);
    }

    fn dispatch(&self, permits: usize, mut messages: Vec<Message>) {
        if messages.len() > permits {
            log::warn!(
                "[{}] Fetched {} messages for {} permits, returning the excess to the queue",
                self.id,
                messages.len(),
                permits
            );
            // Not processed, so redelivered once their lease expires
            messages.truncate(permits);
        }

        if messages.is_empty() {
            self.back_pressure.release(permits, ReleaseReason::NoneFetched);
            return;
        }
        // Also sent when every permit was used, so adaptive handlers see the activity
        self.back_pressure
            .release(permits - messages.len(), ReleaseReason::PartialFetch);

        log::debug!("[{}] Fetched {} messages", self.id, messages.len());
        let messages: Vec<Arc<Message>> = messages.into_iter().map(Arc::new).collect();
        let guard = self.in_flight.enter();
        let sink = self.sink.clone();
        let context = self.context.clone();
        tokio::spawn(async move {
            sink.emit(messages, context).await;
            drop(guard);
        });
    }
}

pub struct ListenerContainerBuilder {
    id: String,
    client: Arc<dyn QueueClient>,
    listener: Listener,
    options: ContainerOptions,
    error_handler: Arc<dyn ErrorHandler>,
    acknowledgement_callback: Arc<dyn AcknowledgementResultCallback>,
    back_pressure: Option<Arc<CompositeBackPressureHandler>>,
    component_factory: Option<Box<dyn ContainerComponentFactory>>,
}

impl ListenerContainerBuilder {
    pub fn options(mut self, options: ContainerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn error_handler(mut self, error_handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = error_handler;
        self
    }

    pub fn acknowledgement_callback(
        mut self,
        callback: Arc<dyn AcknowledgementResultCallback>,
    ) -> Self {
        self.acknowledgement_callback = callback;
        self
    }

    /// Use this handler chain instead of the one built from the options
    pub fn back_pressure(mut self, handler: Arc<CompositeBackPressureHandler>) -> Self {
        self.back_pressure = Some(handler);
        self
    }

    /// Override the sink / acknowledgement factory chosen by `options.fifo`
    pub fn component_factory(mut self, factory: Box<dyn ContainerComponentFactory>) -> Self {
        self.component_factory = Some(factory);
        self
    }

    pub fn build(self) -> ContainerResult<Arc<ListenerContainer>> {
        self.options.validate()?;
        let expected_mode = if self.listener.is_batch() {
            ListenerMode::Batch
        } else {
            ListenerMode::Single
        };
        if self.options.listener_mode != expected_mode {
            return Err(ContainerError::configuration(format!(
                "listener-mode is {} but a {} listener was given",
                self.options.listener_mode, expected_mode
            )));
        }

        let back_pressure = match self.back_pressure {
            Some(handler) => handler,
            None => create_back_pressure_handler(&self.options, &self.id)?,
        };
        let factory = self
            .component_factory
            .unwrap_or_else(|| component_factory(&self.options));
        let sink = factory.create_message_sink(&self.options, self.client.clone());
        let acknowledgement = factory.create_acknowledgement_processor(
            &self.options,
            self.client.clone(),
            self.acknowledgement_callback,
        )?;

        let release_target: Arc<dyn BackPressureHandler> = back_pressure.clone();
        let context = MessageProcessingContext::new(
            self.listener,
            acknowledgement.clone(),
            self.error_handler,
            release_target,
        );
        let (stop_signal, _) = watch::channel(false);

        Ok(Arc::new(ListenerContainer {
            id: self.id,
            options: self.options,
            client: self.client,
            back_pressure,
            sink,
            acknowledgement,
            context,
            state: Mutex::new(ContainerState::Created),
            stop_signal,
            poll_task: Mutex::new(None),
            in_flight: Arc::new(InFlightBatches::default()),
        }))
    }
}
