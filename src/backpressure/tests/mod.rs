//! Test suites for the back-pressure handlers, one file per handler

mod concurrency;
