//! Concurrency primitives coordinating the pipeline stages.
//!
//! - [`shutdown`] broadcasts the cooperative stop signal every worker checks between
//!   iterations.
//! - [`backpressure`] holds the queue between the fetch and dispatch stages, which pauses
//!   fetching once too many batches are waiting.

pub mod backpressure;
pub mod shutdown;
