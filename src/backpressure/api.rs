//! Public API for back-pressure handlers

pub use crate::backpressure::composite::CompositeBackPressureHandler;
pub use crate::backpressure::concurrency::ConcurrencyLimiterHandler;
pub use crate::backpressure::full_batch::FullBatchHandler;
pub use crate::backpressure::throughput::{ThroughputAdaptiveHandler, ThroughputMode};

// Handler traits and shared enums
pub use crate::backpressure::{
    BackPressureHandler, BackPressureMode, BatchAwareBackPressureHandler, ReleaseReason,
};
