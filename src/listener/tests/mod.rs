//! Test suites for listener containers
