//! Container configuration
//!
//! Options are plain values with builder-style setters. They can also be read
//! from a TOML table using kebab-case keys, with durations given in
//! milliseconds:
//!
//! ```toml
//! batch-size = 10
//! total-permits = 20
//! acquire-timeout-ms = 10000
//! acknowledgement-ordering = "ORDERED_BY_GROUP"
//! listener-mode = "SINGLE"
//! fifo = true
//! fifo-batch-grouping-strategy = "PROCESS_MULTIPLE_GROUPS_IN_SAME_BATCH"
//! ```

use crate::acknowledgement::{AcknowledgementOrdering, DEFAULT_MAX_ACKNOWLEDGEMENTS_PER_BATCH};
use crate::backpressure::BackPressureMode;
use crate::core::retry::{BackOffPolicy, RetryPolicy};
use crate::listener::error::{ContainerError, ContainerResult};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_TOTAL_PERMITS: usize = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_NO_PERMITS_RETURNED_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_LISTENER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_ACKNOWLEDGEMENT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_ACK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_ACK_THRESHOLD: usize = 10;

/// Whether the listener takes messages one at a time or a whole batch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ListenerMode {
    #[default]
    Single,
    Batch,
}

/// How a FIFO container splits a fetched batch that spans several groups
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FifoBatchGroupingStrategy {
    /// One sub-batch per group, groups dispatched in parallel
    #[default]
    ProcessMessageGroupsInParallelBatches,
    /// The whole batch goes to the listener together, groups mixed
    ProcessMultipleGroupsInSameBatch,
}

#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Messages requested per poll
    pub batch_size: usize,
    /// Ceiling on messages in flight at once
    pub total_permits: usize,
    /// How long a poll waits for a first free permit
    pub acquire_timeout: Duration,
    /// Pause after a poll that was granted no permits at all
    pub no_permits_returned_wait_timeout: Duration,
    /// Long-poll wait passed to each fetch
    pub poll_timeout: Duration,
    /// Keep extending leases to this length while messages are processed
    pub message_visibility: Option<Duration>,
    /// Batching acknowledgement: flush once this many are pending
    pub ack_threshold: Option<usize>,
    /// Batching acknowledgement: flush once the oldest pending is this old
    pub ack_interval: Option<Duration>,
    pub acknowledgement_ordering: Option<AcknowledgementOrdering>,
    pub listener_mode: ListenerMode,
    pub back_pressure_mode: BackPressureMode,
    pub listener_shutdown_timeout: Duration,
    pub acknowledgement_shutdown_timeout: Duration,
    pub poll_back_off: BackOffPolicy,
    pub retry_policy: RetryPolicy,
    pub max_acknowledgements_per_batch: usize,
    pub fifo: bool,
    pub fifo_batch_grouping_strategy: FifoBatchGroupingStrategy,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            total_permits: DEFAULT_TOTAL_PERMITS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            no_permits_returned_wait_timeout: DEFAULT_NO_PERMITS_RETURNED_WAIT_TIMEOUT,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            message_visibility: None,
            ack_threshold: None,
            ack_interval: None,
            acknowledgement_ordering: None,
            listener_mode: ListenerMode::default(),
            back_pressure_mode: BackPressureMode::default(),
            listener_shutdown_timeout: DEFAULT_LISTENER_SHUTDOWN_TIMEOUT,
            acknowledgement_shutdown_timeout: DEFAULT_ACKNOWLEDGEMENT_SHUTDOWN_TIMEOUT,
            poll_back_off: BackOffPolicy::default(),
            retry_policy: RetryPolicy::default(),
            max_acknowledgements_per_batch: DEFAULT_MAX_ACKNOWLEDGEMENTS_PER_BATCH,
            fifo: false,
            fifo_batch_grouping_strategy: FifoBatchGroupingStrategy::default(),
        }
    }
}

impl ContainerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_total_permits(mut self, total_permits: usize) -> Self {
        self.total_permits = total_permits;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_no_permits_returned_wait_timeout(mut self, timeout: Duration) -> Self {
        self.no_permits_returned_wait_timeout = timeout;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_message_visibility(mut self, visibility: Duration) -> Self {
        self.message_visibility = Some(visibility);
        self
    }

    pub fn with_ack_threshold(mut self, threshold: usize) -> Self {
        self.ack_threshold = Some(threshold);
        self
    }

    pub fn with_ack_interval(mut self, interval: Duration) -> Self {
        self.ack_interval = Some(interval);
        self
    }

    pub fn with_acknowledgement_ordering(mut self, ordering: AcknowledgementOrdering) -> Self {
        self.acknowledgement_ordering = Some(ordering);
        self
    }

    pub fn with_listener_mode(mut self, mode: ListenerMode) -> Self {
        self.listener_mode = mode;
        self
    }

    pub fn with_back_pressure_mode(mut self, mode: BackPressureMode) -> Self {
        self.back_pressure_mode = mode;
        self
    }

    pub fn with_listener_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.listener_shutdown_timeout = timeout;
        self
    }

    pub fn with_acknowledgement_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.acknowledgement_shutdown_timeout = timeout;
        self
    }

    pub fn with_poll_back_off(mut self, back_off: BackOffPolicy) -> Self {
        self.poll_back_off = back_off;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_fifo(mut self, fifo: bool) -> Self {
        self.fifo = fifo;
        self
    }

    pub fn with_fifo_batch_grouping_strategy(
        mut self,
        strategy: FifoBatchGroupingStrategy,
    ) -> Self {
        self.fifo_batch_grouping_strategy = strategy;
        self
    }

    /// Reject combinations the container cannot run with
    pub fn validate(&self) -> ContainerResult<()> {
        if self.batch_size == 0 {
            return Err(ContainerError::configuration(
                "batch-size must be greater than zero",
            ));
        }
        if self.total_permits == 0 {
            return Err(ContainerError::configuration(
                "total-permits must be greater than zero",
            ));
        }
        if self.back_pressure_mode == BackPressureMode::AlwaysPollMaxMessages
            && self.total_permits < self.batch_size
        {
            return Err(ContainerError::configuration(format!(
                "total-permits ({}) must be at least batch-size ({}) with {}",
                self.total_permits, self.batch_size, self.back_pressure_mode
            )));
        }
        if self.max_acknowledgements_per_batch == 0 {
            return Err(ContainerError::configuration(
                "max-acknowledgements-per-batch must be greater than zero",
            ));
        }
        if self.poll_back_off.multiplier < 1.0 {
            return Err(ContainerError::configuration(
                "back-off-multiplier must be at least 1.0",
            ));
        }
        if self
            .message_visibility
            .is_some_and(|visibility| visibility < Duration::from_millis(2))
        {
            return Err(ContainerError::configuration(
                "message-visibility-ms must be at least 2",
            ));
        }
        Ok(())
    }

    /// Read options from a TOML table, starting from the defaults
    pub fn from_toml(config: &toml::Table) -> ContainerResult<Self> {
        let mut options = Self::default();

        if let Some(value) = get_usize(config, "batch-size")? {
            options.batch_size = value;
        }
        if let Some(value) = get_usize(config, "total-permits")? {
            options.total_permits = value;
        }
        if let Some(value) = get_millis(config, "acquire-timeout-ms")? {
            options.acquire_timeout = value;
        }
        if let Some(value) = get_millis(config, "no-permits-wait-ms")? {
            options.no_permits_returned_wait_timeout = value;
        }
        if let Some(value) = get_millis(config, "poll-timeout-ms")? {
            options.poll_timeout = value;
        }
        options.message_visibility = get_millis(config, "message-visibility-ms")?;
        options.ack_threshold = get_usize(config, "ack-threshold")?;
        options.ack_interval = get_millis(config, "ack-interval-ms")?;
        options.acknowledgement_ordering = get_enum(config, "acknowledgement-ordering")?;
        if let Some(value) = get_enum(config, "listener-mode")? {
            options.listener_mode = value;
        }
        if let Some(value) = get_enum(config, "back-pressure-mode")? {
            options.back_pressure_mode = value;
        }
        if let Some(value) = get_millis(config, "listener-shutdown-timeout-ms")? {
            options.listener_shutdown_timeout = value;
        }
        if let Some(value) = get_millis(config, "acknowledgement-shutdown-timeout-ms")? {
            options.acknowledgement_shutdown_timeout = value;
        }
        if let Some(value) = get_millis(config, "back-off-initial-ms")? {
            options.poll_back_off.initial_delay = value;
        }
        if let Some(value) = get_float(config, "back-off-multiplier")? {
            options.poll_back_off.multiplier = value;
        }
        if let Some(value) = get_millis(config, "back-off-max-ms")? {
            options.poll_back_off.max_delay = value;
        }
        if let Some(value) = get_usize(config, "commit-attempts")? {
            options.retry_policy.max_attempts = value;
        }
        if let Some(value) = get_millis(config, "commit-retry-delay-ms")? {
            options.retry_policy.delay = value;
        }
        if let Some(value) = get_usize(config, "max-acknowledgements-per-batch")? {
            options.max_acknowledgements_per_batch = value;
        }
        if let Some(value) = get_enum(config, "fifo-batch-grouping-strategy")? {
            options.fifo_batch_grouping_strategy = value;
        }
        if let Some(value) = config.get("fifo") {
            options.fifo = value
                .as_bool()
                .ok_or_else(|| invalid_type("fifo", "a boolean"))?;
        }

        options.validate()?;
        Ok(options)
    }
}

fn invalid_type(key: &str, expected: &str) -> ContainerError {
    ContainerError::configuration(format!("{} must be {}", key, expected))
}

fn get_usize(config: &toml::Table, key: &str) -> ContainerResult<Option<usize>> {
    config
        .get(key)
        .map(|value| {
            value
                .as_integer()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| invalid_type(key, "a non-negative integer"))
        })
        .transpose()
}

fn get_millis(config: &toml::Table, key: &str) -> ContainerResult<Option<Duration>> {
    Ok(get_usize(config, key)?.map(|millis| Duration::from_millis(millis as u64)))
}

fn get_float(config: &toml::Table, key: &str) -> ContainerResult<Option<f64>> {
    config
        .get(key)
        .map(|value| {
            value
                .as_float()
                .or_else(|| value.as_integer().map(|n| n as f64))
                .ok_or_else(|| invalid_type(key, "a number"))
        })
        .transpose()
}

fn get_enum<T: FromStr>(config: &toml::Table, key: &str) -> ContainerResult<Option<T>> {
    config
        .get(key)
        .map(|value| {
            value
                .as_str()
                .and_then(|s| T::from_str(&s.to_ascii_uppercase().replace('-', "_")).ok())
                .ok_or_else(|| {
                    ContainerError::configuration(format!(
                        "{} has an unrecognised value: {}",
                        key, value
                    ))
                })
        })
        .transpose()
}
