//! Test suites for acknowledgement processing

mod executor;
mod utils;
