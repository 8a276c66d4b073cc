//! Core services and infrastructure shared by the listener components

pub mod error_handling;
pub mod logging;
pub mod retry;
pub mod sequencer;
pub mod shutdown;
