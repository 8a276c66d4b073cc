//! The demo runner binary

pub mod args;
pub mod config;
pub mod display;
pub mod startup;
