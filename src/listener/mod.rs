//! Listener containers
//!
//! A [`ListenerContainer`] ties one queue to one listener. It polls under
//! back-pressure, dispatches through a message sink and acknowledges through
//! an acknowledgement processor, all chosen from its [`ContainerOptions`].
//! A [`ListenerContainerRegistry`] manages the lifecycle of many containers.

mod container;
mod error;
mod factory;
mod handler;
mod options;
mod registry;

// Public API module
pub mod api;

pub use api::*;

#[cfg(test)]
mod tests;
