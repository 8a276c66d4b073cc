//! Public API for listener containers
//!
//! Everything outside this module imports containers, options and listener
//! types from here.

// Containers and lifecycle
pub use crate::listener::container::{ContainerState, ListenerContainer, ListenerContainerBuilder};
pub use crate::listener::registry::ListenerContainerRegistry;

// Component wiring
pub use crate::listener::factory::{
    component_factory, create_back_pressure_handler, ContainerComponentFactory,
    FifoComponentFactory, StandardComponentFactory,
};

// Options
pub use crate::listener::options::*;

// Listener and error handler traits
pub use crate::listener::handler::{
    BatchMessageListener, ErrorHandler, Listener, LoggingErrorHandler, MessageListener,
};

// Error handling
pub use crate::listener::error::{ContainerError, ContainerResult, ListenerError, ListenerResult};
