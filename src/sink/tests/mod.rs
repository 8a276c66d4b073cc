//! Test suites for the message sinks

mod utils;
