//! Builds a container's components from its options
//!
//! Standard and FIFO queues differ in how batches are dispatched and
//! acknowledged:
//!
//! | Queue    | Sink                                       | Acknowledgement                                   |
//! |----------|--------------------------------------------|---------------------------------------------------|
//! | standard | fan-out, or batch                          | batching (1s / 10, `PARALLEL`) unless both are 0  |
//! | FIFO     | ordered or batch, grouped by message group | immediate (`PARALLEL`), batching (`ORDERED`) once an interval or threshold is set |
//!
//! Either sink is wrapped in lease extension when a message visibility is
//! configured; for FIFO the extension runs per group. A FIFO container set to
//! `PROCESS_MULTIPLE_GROUPS_IN_SAME_BATCH` skips the grouping step and hands
//! each fetched batch to the ordered or batch sink as a whole.
//!
//! Only FIFO queues carry a message group, so `ORDERED_BY_GROUP`
//! acknowledgement on a standard queue is a configuration error.

use crate::acknowledgement::{
    AcknowledgementExecutor, AcknowledgementOrdering, AcknowledgementProcessor,
    AcknowledgementResultCallback, BatchingAcknowledgementProcessor,
    ImmediateAcknowledgementProcessor,
};
use crate::backpressure::{
    BackPressureHandler, BackPressureMode, CompositeBackPressureHandler,
    ConcurrencyLimiterHandler, FullBatchHandler, ThroughputAdaptiveHandler,
};
use crate::listener::error::ContainerResult;
use crate::listener::options::{
    ContainerOptions, FifoBatchGroupingStrategy, ListenerMode, DEFAULT_ACK_INTERVAL,
    DEFAULT_ACK_THRESHOLD,
};
use crate::queue::{group_id_grouping, MessageGroupingFunction, QueueClient};
use crate::sink::{
    BatchMessageSink, FanOutMessageSink, MessageGroupingSinkAdapter, MessageSink,
    MessageVisibilityExtendingSinkAdapter, OrderedMessageSink,
};
use std::sync::Arc;
use std::time::Duration;

/// Creates the sink and acknowledgement processor for one kind of queue
pub trait ContainerComponentFactory: Send + Sync {
    fn create_message_sink(
        &self,
        options: &ContainerOptions,
        client: Arc<dyn QueueClient>,
    ) -> Arc<dyn MessageSink>;

    fn create_acknowledgement_processor(
        &self,
        options: &ContainerOptions,
        client: Arc<dyn QueueClient>,
        callback: Arc<dyn AcknowledgementResultCallback>,
    ) -> ContainerResult<Arc<dyn AcknowledgementProcessor>>;
}

/// Picks the factory matching `options.fifo`
pub fn component_factory(options: &ContainerOptions) -> Box<dyn ContainerComponentFactory> {
    if options.fifo {
        Box::new(FifoComponentFactory)
    } else {
        Box::new(StandardComponentFactory)
    }
}

/// Build the back-pressure chain for `options.back_pressure_mode`
///
/// The concurrency limiter always comes first, and the full-batch gate last.
pub fn create_back_pressure_handler(
    options: &ContainerOptions,
    id: &str,
) -> ContainerResult<Arc<CompositeBackPressureHandler>> {
    options.validate()?;

    let limiter = ConcurrencyLimiterHandler::new(
        options.total_permits,
        options.batch_size,
        options.acquire_timeout,
    )
    .with_id(format!("{}/concurrency", id));
    let mut handlers: Vec<Arc<dyn BackPressureHandler>> = vec![Arc::new(limiter)];

    if options.back_pressure_mode != BackPressureMode::FixedHighThroughput {
        handlers.push(Arc::new(
            ThroughputAdaptiveHandler::new(options.batch_size)
                .with_id(format!("{}/throughput", id)),
        ));
    }
    if options.back_pressure_mode == BackPressureMode::AlwaysPollMaxMessages {
        handlers.push(Arc::new(FullBatchHandler::new(options.batch_size)));
    }

    Ok(Arc::new(
        CompositeBackPressureHandler::new(
            handlers,
            options.batch_size,
            options.no_permits_returned_wait_timeout,
        )
        .with_id(format!("{}/back-pressure", id)),
    ))
}

pub struct StandardComponentFactory;

impl ContainerComponentFactory for StandardComponentFactory {
    fn create_message_sink(
        &self,
        options: &ContainerOptions,
        client: Arc<dyn QueueClient>,
    ) -> Arc<dyn MessageSink> {
        let sink: Arc<dyn MessageSink> = match options.listener_mode {
            ListenerMode::Single => Arc::new(FanOutMessageSink),
            ListenerMode::Batch => Arc::new(BatchMessageSink),
        };
        with_visibility_extension(sink, options, client)
    }

    fn create_acknowledgement_processor(
        &self,
        options: &ContainerOptions,
        client: Arc<dyn QueueClient>,
        callback: Arc<dyn AcknowledgementResultCallback>,
    ) -> ContainerResult<Arc<dyn AcknowledgementProcessor>> {
        let interval = options.ack_interval.unwrap_or(DEFAULT_ACK_INTERVAL);
        let threshold = options.ack_threshold.unwrap_or(DEFAULT_ACK_THRESHOLD);
        let ordering = options
            .acknowledgement_ordering
            .unwrap_or(AcknowledgementOrdering::Parallel);
        let executor = create_executor(options, client, callback, ordering, None)?;

        if interval.is_zero() && threshold == 0 {
            Ok(Arc::new(ImmediateAcknowledgementProcessor::new(executor)))
        } else {
            Ok(Arc::new(batching(executor, threshold, interval, options)))
        }
    }
}

pub struct FifoComponentFactory;

impl ContainerComponentFactory for FifoComponentFactory {
    fn create_message_sink(
        &self,
        options: &ContainerOptions,
        client: Arc<dyn QueueClient>,
    ) -> Arc<dyn MessageSink> {
        let delivery: Arc<dyn MessageSink> = match options.listener_mode {
            ListenerMode::Single => Arc::new(OrderedMessageSink),
            ListenerMode::Batch => Arc::new(BatchMessageSink),
        };
        let delivery = with_visibility_extension(delivery, options, client);
        match options.fifo_batch_grouping_strategy {
            FifoBatchGroupingStrategy::ProcessMessageGroupsInParallelBatches => Arc::new(
                MessageGroupingSinkAdapter::new(delivery, group_id_grouping()),
            ),
            FifoBatchGroupingStrategy::ProcessMultipleGroupsInSameBatch => delivery,
        }
    }

    fn create_acknowledgement_processor(
        &self,
        options: &ContainerOptions,
        client: Arc<dyn QueueClient>,
        callback: Arc<dyn AcknowledgementResultCallback>,
    ) -> ContainerResult<Arc<dyn AcknowledgementProcessor>> {
        if options.ack_interval.is_none() && options.ack_threshold.is_none() {
            let ordering = options
                .acknowledgement_ordering
                .unwrap_or(AcknowledgementOrdering::Parallel);
            let executor =
                create_executor(options, client, callback, ordering, Some(group_id_grouping()))?;
            return Ok(Arc::new(ImmediateAcknowledgementProcessor::new(executor)));
        }

        let ordering = options
            .acknowledgement_ordering
            .unwrap_or(AcknowledgementOrdering::Ordered);
        let executor =
            create_executor(options, client, callback, ordering, Some(group_id_grouping()))?;
        Ok(Arc::new(batching(
            executor,
            options.ack_threshold.unwrap_or(DEFAULT_ACK_THRESHOLD),
            options.ack_interval.unwrap_or(DEFAULT_ACK_INTERVAL),
            options,
        )))
    }
}

/// `grouping` is only known for FIFO queues; ORDERED_BY_GROUP without it is
/// rejected by the executor
fn create_executor(
    options: &ContainerOptions,
    client: Arc<dyn QueueClient>,
    callback: Arc<dyn AcknowledgementResultCallback>,
    ordering: AcknowledgementOrdering,
    grouping: Option<MessageGroupingFunction>,
) -> ContainerResult<AcknowledgementExecutor> {
    Ok(AcknowledgementExecutor::new(client, ordering, grouping)?
        .with_retry_policy(options.retry_policy.clone())
        .with_max_acknowledgements_per_batch(options.max_acknowledgements_per_batch)
        .with_callback(callback))
}

fn batching(
    executor: AcknowledgementExecutor,
    threshold: usize,
    interval: Duration,
    options: &ContainerOptions,
) -> BatchingAcknowledgementProcessor {
    BatchingAcknowledgementProcessor::new(
        executor,
        threshold,
        interval,
        options.acknowledgement_shutdown_timeout,
    )
}

fn with_visibility_extension(
    sink: Arc<dyn MessageSink>,
    options: &ContainerOptions,
    client: Arc<dyn QueueClient>,
) -> Arc<dyn MessageSink> {
    match options.message_visibility {
        Some(visibility) => Arc::new(
            MessageVisibilityExtendingSinkAdapter::new(sink, client, visibility)
                .with_retry_policy(options.retry_policy.clone()),
        ),
        None => sink,
    }
}
