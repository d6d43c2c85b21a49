//! Tracing setup shared by relay hosts and tests.

pub mod tracing;
